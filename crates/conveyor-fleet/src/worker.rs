//! The worker capability trait and its remote implementation.

use async_trait::async_trait;
use std::sync::Arc;

use conveyor_core::container::{ContainerSpec, Identifier};
use conveyor_core::runtime::{Container, ContainerHost, Volume, VolumeHost};
use conveyor_core::worker::{WorkerInfo, WorkerMismatch, WorkerSpec};
use conveyor_core::Handle;
use conveyor_db::{ContainerRecord, ContainerStore};

use crate::FleetError;

/// One execution host, as seen by the pool.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Advisory load hint, refreshed by heartbeats. Diagnostics only.
    fn active_containers(&self) -> i32;

    /// Can this worker host a container with the given requirements?
    fn satisfying(&self, spec: &WorkerSpec) -> Result<(), WorkerMismatch>;

    /// Create a container and record it in the store under the identifier.
    async fn create_container(
        &self,
        identifier: &Identifier,
        spec: &ContainerSpec,
    ) -> Result<Arc<dyn Container>, FleetError>;

    /// Look a container up by handle on the host itself. `Ok(None)` means
    /// the host no longer knows the handle.
    async fn lookup_container(
        &self,
        handle: &Handle,
    ) -> Result<Option<Arc<dyn Container>>, FleetError>;

    /// Create a volume scoped to one of this worker's containers.
    async fn create_volume(&self, container: &Handle) -> Result<Arc<dyn Volume>, FleetError>;
}

/// A worker reached over its container-host and volume-host clients.
pub struct RemoteWorker {
    info: WorkerInfo,
    containers: Arc<dyn ContainerHost>,
    volumes: Arc<dyn VolumeHost>,
    store: Arc<dyn ContainerStore>,
}

impl RemoteWorker {
    pub fn new(
        info: WorkerInfo,
        containers: Arc<dyn ContainerHost>,
        volumes: Arc<dyn VolumeHost>,
        store: Arc<dyn ContainerStore>,
    ) -> Self {
        Self {
            info,
            containers,
            volumes,
            store,
        }
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }
}

#[async_trait]
impl Worker for RemoteWorker {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn active_containers(&self) -> i32 {
        self.info.active_containers
    }

    fn satisfying(&self, spec: &WorkerSpec) -> Result<(), WorkerMismatch> {
        self.info.satisfying(spec)
    }

    async fn create_container(
        &self,
        identifier: &Identifier,
        spec: &ContainerSpec,
    ) -> Result<Arc<dyn Container>, FleetError> {
        let handle = Handle::new();
        let container = self.containers.create(&handle, spec).await?;

        self.store
            .create_container(&ContainerRecord {
                handle: container.handle().clone(),
                worker_name: self.info.name.clone(),
                identifier: identifier.clone(),
            })
            .await?;

        tracing::info!(
            worker = %self.info.name,
            handle = %container.handle(),
            step = %identifier.name,
            "created container"
        );

        Ok(container)
    }

    async fn lookup_container(
        &self,
        handle: &Handle,
    ) -> Result<Option<Arc<dyn Container>>, FleetError> {
        Ok(self.containers.lookup(handle).await?)
    }

    async fn create_volume(&self, container: &Handle) -> Result<Arc<dyn Volume>, FleetError> {
        Ok(self.volumes.create_volume(container).await?)
    }
}
