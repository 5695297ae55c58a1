//! Delivering abort signals to in-flight builds.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

use conveyor_core::runtime::Signal;

/// Registry of signal channels for builds currently executing. The launcher
/// registers before running a resource operation; an API abort or a process
/// shutdown delivers into the channel, and the runner stops the container.
#[derive(Default)]
pub struct AbortBus {
    channels: Mutex<HashMap<i64, mpsc::Sender<Signal>>>,
}

impl AbortBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a build and get the receiver its runner should select on.
    pub fn register(&self, build_id: i64) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(1);
        self.channels.lock().insert(build_id, tx);
        rx
    }

    pub fn deregister(&self, build_id: i64) {
        self.channels.lock().remove(&build_id);
    }

    /// Deliver an abort to one build. Returns whether a runner was
    /// listening.
    pub fn abort(&self, build_id: i64) -> bool {
        match self.channels.lock().get(&build_id) {
            Some(tx) => tx.try_send(Signal::Interrupt).is_ok(),
            None => false,
        }
    }

    /// Deliver a signal to every in-flight build, for process shutdown.
    pub fn abort_all(&self, signal: Signal) {
        for tx in self.channels.lock().values() {
            let _ = tx.try_send(signal);
        }
    }
}
