//! Fetch, publish, and check operations against a resource container.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use bytes::Bytes;
use conveyor_core::resource::{MetadataField, Params, Source, Version};
use conveyor_core::runtime::{Container, OutputSink, Signal, Volume};
use conveyor_core::RuntimeResult;

use crate::error::ResourceError;
use crate::runner::run_script;

/// Caller-facing output wiring for a resource operation. Stdout of the
/// script is the protocol response and is never forwarded; stderr goes to
/// the configured sink in real time.
#[derive(Default)]
pub struct IoConfig {
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

#[derive(Serialize)]
struct ScriptRequest<'a> {
    source: &'a Source,
    params: &'a Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a Version>,
}

#[derive(Deserialize)]
struct ScriptResponse {
    #[serde(default)]
    version: Version,
    #[serde(default)]
    metadata: Vec<MetadataField>,
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    source: &'a Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a Version>,
}

/// A resource bound to its container.
pub struct Resource {
    container: Arc<dyn Container>,
}

impl Resource {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    /// Fetch a version of the resource into the volume
    /// (`/opt/resource/in`). Resumable and memoized across restarts.
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch(
        &self,
        volume: Arc<dyn Volume>,
        io: IoConfig,
        source: &Source,
        params: &Params,
        version: Option<&Version>,
        signals: mpsc::Receiver<Signal>,
        ready: oneshot::Sender<()>,
    ) -> Result<VersionedSource, ResourceError> {
        self.run_versioned("in", "get", volume, io, source, params, version, signals, ready)
            .await
    }

    /// Publish from the volume, producing a new version
    /// (`/opt/resource/out`). Resumable and memoized across restarts.
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        volume: Arc<dyn Volume>,
        io: IoConfig,
        source: &Source,
        params: &Params,
        version: Option<&Version>,
        signals: mpsc::Receiver<Signal>,
        ready: oneshot::Sender<()>,
    ) -> Result<VersionedSource, ResourceError> {
        self.run_versioned("out", "put", volume, io, source, params, version, signals, ready)
            .await
    }

    /// List versions after `from`, oldest first (`/opt/resource/check`).
    /// Check is cheap and idempotent, so there is no memoization or
    /// reattach; it runs fresh every time.
    pub async fn check(
        &self,
        source: &Source,
        from: Option<&Version>,
    ) -> Result<Vec<Version>, ResourceError> {
        let (_signals_tx, signals) = mpsc::channel(1);
        let (ready, _ready_rx) = oneshot::channel();

        let request = CheckRequest {
            source,
            version: from,
        };

        let stdout = run_script(
            self.container.as_ref(),
            "/opt/resource/check",
            vec![],
            &request,
            None,
            signals,
            ready,
            false,
        )
        .await?;

        serde_json::from_str(&stdout).map_err(ResourceError::MalformedResponse)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_versioned(
        &self,
        script: &str,
        dir: &str,
        volume: Arc<dyn Volume>,
        io: IoConfig,
        source: &Source,
        params: &Params,
        version: Option<&Version>,
        signals: mpsc::Receiver<Signal>,
        ready: oneshot::Sender<()>,
    ) -> Result<VersionedSource, ResourceError> {
        let base_dir = format!("/tmp/build/{dir}");
        let request = ScriptRequest {
            source,
            params,
            version,
        };

        let stdout = run_script(
            self.container.as_ref(),
            &format!("/opt/resource/{script}"),
            vec![base_dir.clone()],
            &request,
            io.stderr,
            signals,
            ready,
            true,
        )
        .await?;

        let response: ScriptResponse =
            serde_json::from_str(&stdout).map_err(ResourceError::MalformedResponse)?;

        Ok(VersionedSource {
            version: response.version,
            metadata: response.metadata,
            volume,
            base_dir,
        })
    }
}

/// The product of a successful fetch or publish: the version, its metadata,
/// and the volume holding the bits. Stream operations all resolve against
/// the operation's base directory so one invocation sees a single tree.
pub struct VersionedSource {
    version: Version,
    metadata: Vec<MetadataField>,
    volume: Arc<dyn Volume>,
    base_dir: String,
}

impl std::fmt::Debug for VersionedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedSource")
            .field("version", &self.version)
            .field("metadata", &self.metadata)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl VersionedSource {
    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn metadata(&self) -> &[MetadataField] {
        &self.metadata
    }

    pub fn volume(&self) -> &Arc<dyn Volume> {
        &self.volume
    }

    /// Extract a tar stream under `path`, relative to the operation's tree.
    pub async fn stream_in(&self, path: &str, content: Bytes) -> RuntimeResult<()> {
        self.volume
            .stream_in(&format!("{}/{}", self.base_dir, path), content)
            .await
    }

    /// Tar up `path`, relative to the operation's tree.
    pub async fn stream_out(&self, path: &str) -> RuntimeResult<Bytes> {
        self.volume
            .stream_out(&format!("{}/{}", self.base_dir, path))
            .await
    }
}
