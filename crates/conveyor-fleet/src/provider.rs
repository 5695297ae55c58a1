//! Turning registry records into live workers.

use async_trait::async_trait;
use std::sync::Arc;

use conveyor_core::container::Identifier;
use conveyor_core::runtime::{ContainerHost, VolumeHost};
use conveyor_core::worker::WorkerInfo;
use conveyor_core::{Handle, RuntimeError};
use conveyor_db::{ContainerRecord, ContainerStore, WorkerRegistry};

use crate::worker::{RemoteWorker, Worker};
use crate::FleetError;

/// Source of workers and container records for the pool.
#[async_trait]
pub trait WorkerProvider: Send + Sync {
    async fn workers(&self) -> Result<Vec<Arc<dyn Worker>>, FleetError>;

    async fn get_worker(&self, name: &str) -> Result<Option<Arc<dyn Worker>>, FleetError>;

    async fn find_container_by_handle(
        &self,
        handle: &Handle,
    ) -> Result<Option<ContainerRecord>, FleetError>;

    async fn find_container_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<ContainerRecord>, FleetError>;

    async fn reap_container(&self, handle: &Handle) -> Result<(), FleetError>;
}

/// Connects to a worker's container and volume hosts.
#[async_trait]
pub trait WorkerDialer: Send + Sync {
    async fn dial(
        &self,
        info: &WorkerInfo,
    ) -> Result<(Arc<dyn ContainerHost>, Arc<dyn VolumeHost>), RuntimeError>;
}

/// Provider backed by the registry plus a dialer that turns records into
/// live clients.
pub struct DbWorkerProvider {
    registry: Arc<dyn WorkerRegistry>,
    containers: Arc<dyn ContainerStore>,
    dialer: Arc<dyn WorkerDialer>,
}

impl DbWorkerProvider {
    pub fn new(
        registry: Arc<dyn WorkerRegistry>,
        containers: Arc<dyn ContainerStore>,
        dialer: Arc<dyn WorkerDialer>,
    ) -> Self {
        Self {
            registry,
            containers,
            dialer,
        }
    }

    async fn connect(&self, info: WorkerInfo) -> Result<Arc<dyn Worker>, FleetError> {
        let (containers, volumes) = self.dialer.dial(&info).await?;
        Ok(Arc::new(RemoteWorker::new(
            info,
            containers,
            volumes,
            self.containers.clone(),
        )))
    }
}

#[async_trait]
impl WorkerProvider for DbWorkerProvider {
    async fn workers(&self) -> Result<Vec<Arc<dyn Worker>>, FleetError> {
        let infos = self.registry.workers().await?;
        let mut workers = Vec::with_capacity(infos.len());
        for info in infos {
            workers.push(self.connect(info).await?);
        }
        Ok(workers)
    }

    async fn get_worker(&self, name: &str) -> Result<Option<Arc<dyn Worker>>, FleetError> {
        match self.registry.get_worker(name).await? {
            Some(info) => Ok(Some(self.connect(info).await?)),
            None => Ok(None),
        }
    }

    async fn find_container_by_handle(
        &self,
        handle: &Handle,
    ) -> Result<Option<ContainerRecord>, FleetError> {
        Ok(self.containers.find_by_handle(handle).await?)
    }

    async fn find_container_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<ContainerRecord>, FleetError> {
        Ok(self.containers.find_by_identifier(identifier).await?)
    }

    async fn reap_container(&self, handle: &Handle) -> Result<(), FleetError> {
        Ok(self.containers.reap_container(handle).await?)
    }
}
