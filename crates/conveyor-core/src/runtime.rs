//! Container-host capability traits.
//!
//! The container runtime is a remote host consumed over RPC. These traits
//! capture the slice of its API the build pipeline depends on:
//! `conveyor-runtime` provides a Docker-backed client, `conveyor-testkit`
//! provides recording fakes. Everything is object-safe so components hold
//! `Arc<dyn ...>` and tests can swap in doubles.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWrite;

use crate::container::ContainerSpec;
use crate::error::RuntimeResult;
use crate::id::Handle;

/// A signal delivered to an in-flight operation. Any signal means abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

/// Spec for a process to run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub path: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub dir: Option<String>,
}

/// Byte sink for process output.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Stdio wiring for a spawned or reattached process. Stdin is written once
/// and closed; output sinks receive bytes as the process produces them.
#[derive(Default)]
pub struct ProcessIo {
    pub stdin: Option<Bytes>,
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

impl ProcessIo {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A process running (or once running) inside a container.
#[async_trait]
pub trait Process: Send + Sync {
    /// Opaque id used to reattach after an orchestrator restart.
    fn id(&self) -> String;

    /// Wait for the process to exit and return its exit status.
    async fn wait(&self) -> RuntimeResult<i32>;
}

/// One container on a worker.
#[async_trait]
pub trait Container: Send + Sync {
    fn handle(&self) -> &Handle;

    /// Spawn a process inside the container.
    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> RuntimeResult<Box<dyn Process>>;

    /// Reattach to a process spawned by an earlier incarnation of the
    /// orchestrator.
    async fn attach(&self, process_id: &str, io: ProcessIo) -> RuntimeResult<Box<dyn Process>>;

    /// Stop everything in the container. `kill` skips the grace period.
    async fn stop(&self, kill: bool) -> RuntimeResult<()>;

    /// Read a property persisted on the container. Properties survive
    /// orchestrator restarts; the container is the durable store for
    /// in-flight work.
    async fn property(&self, name: &str) -> RuntimeResult<Option<String>>;

    async fn set_property(&self, name: &str, value: &str) -> RuntimeResult<()>;
}

/// A volume on a worker's volume host.
#[async_trait]
pub trait Volume: Send + Sync {
    fn handle(&self) -> &Handle;

    /// Extract a tar archive under `path`.
    async fn stream_in(&self, path: &str, content: Bytes) -> RuntimeResult<()>;

    /// Tar up `path` and return the archive bytes.
    async fn stream_out(&self, path: &str) -> RuntimeResult<Bytes>;
}

/// Client for one worker's container host.
#[async_trait]
pub trait ContainerHost: Send + Sync {
    async fn create(&self, handle: &Handle, spec: &ContainerSpec)
        -> RuntimeResult<Arc<dyn Container>>;

    /// `Ok(None)` when the host no longer knows the handle.
    async fn lookup(&self, handle: &Handle) -> RuntimeResult<Option<Arc<dyn Container>>>;

    async fn destroy(&self, handle: &Handle) -> RuntimeResult<()>;
}

/// Client for one worker's volume host.
#[async_trait]
pub trait VolumeHost: Send + Sync {
    /// Create a volume scoped to the given container.
    async fn create_volume(&self, container: &Handle) -> RuntimeResult<Arc<dyn Volume>>;
}
