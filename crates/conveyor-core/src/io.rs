//! In-memory byte sinks for process output plumbing.

use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use crate::runtime::OutputSink;

/// Growable in-memory sink. Clonable, so one side can write while another
/// holds a reader onto the same bytes.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Box a clone of this buffer as an output sink.
    pub fn sink(&self) -> OutputSink {
        Box::new(self.clone())
    }

    fn append(&self, bytes: &[u8]) {
        self.0.lock().extend_from_slice(bytes);
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.append(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Captures everything written while forwarding to an optional downstream
/// sink. Bytes are captured only once the downstream accepts them, so the
/// capture never runs ahead of the forward.
pub struct TeeSink {
    capture: SharedBuffer,
    forward: Option<OutputSink>,
}

impl TeeSink {
    pub fn new(capture: SharedBuffer, forward: Option<OutputSink>) -> Self {
        Self { capture, forward }
    }
}

impl AsyncWrite for TeeSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match this.forward.as_mut() {
            None => {
                this.capture.append(buf);
                Poll::Ready(Ok(buf.len()))
            }
            Some(forward) => match Pin::new(forward).poll_write(cx, buf) {
                Poll::Ready(Ok(n)) => {
                    this.capture.append(&buf[..n]);
                    Poll::Ready(Ok(n))
                }
                other => other,
            },
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.forward.as_mut() {
            Some(forward) => Pin::new(forward).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.forward.as_mut() {
            Some(forward) => Pin::new(forward).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn shared_buffer_accumulates_writes() {
        let buffer = SharedBuffer::new();
        let mut sink = buffer.sink();
        sink.write_all(b"hello ").await.unwrap();
        sink.write_all(b"world").await.unwrap();
        assert_eq!(buffer.to_string_lossy(), "hello world");
    }

    #[tokio::test]
    async fn tee_captures_and_forwards() {
        let capture = SharedBuffer::new();
        let downstream = SharedBuffer::new();
        let mut tee = TeeSink::new(capture.clone(), Some(downstream.sink()));
        tee.write_all(b"some stderr data").await.unwrap();
        assert_eq!(capture.to_string_lossy(), "some stderr data");
        assert_eq!(downstream.to_string_lossy(), "some stderr data");
    }

    #[tokio::test]
    async fn tee_works_without_downstream() {
        let capture = SharedBuffer::new();
        let mut tee = TeeSink::new(capture.clone(), None);
        tee.write_all(b"data").await.unwrap();
        assert_eq!(capture.to_string_lossy(), "data");
    }
}
