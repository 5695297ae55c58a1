//! Load-balancing façade over the worker fleet.

use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

use conveyor_core::container::{ContainerSpec, Identifier};
use conveyor_core::metrics;
use conveyor_core::runtime::Container;
use conveyor_core::Handle;
use conveyor_db::ContainerRecord;

use crate::provider::WorkerProvider;
use crate::FleetError;

/// Picks workers for new containers and finds existing ones again.
///
/// Placement is uniformly random over the satisfying subset, with a fresh
/// draw per call. Load is deliberately not considered: the advisory
/// active-container count lags heartbeats, and a random spread keeps any
/// one worker from absorbing a thundering herd between refreshes.
pub struct Pool {
    provider: Arc<dyn WorkerProvider>,
}

impl Pool {
    pub fn new(provider: Arc<dyn WorkerProvider>) -> Self {
        Self { provider }
    }

    /// Pick a satisfying worker and create the container on it.
    pub async fn create_container(
        &self,
        identifier: &Identifier,
        spec: &ContainerSpec,
    ) -> Result<Arc<dyn Container>, FleetError> {
        let workers = self.provider.workers().await?;
        if workers.is_empty() {
            return Err(FleetError::NoWorkers);
        }

        let worker_spec = spec.worker_spec();

        let mut compatible = Vec::new();
        for worker in &workers {
            match worker.satisfying(&worker_spec) {
                Ok(()) => compatible.push(worker.clone()),
                Err(mismatch) => {
                    debug!(worker = worker.name(), %mismatch, "worker cannot take container");
                }
            }
        }

        if compatible.is_empty() {
            return Err(FleetError::NoCompatibleWorkers {
                spec: worker_spec,
                workers: workers.iter().map(|w| w.name().to_string()).collect(),
            });
        }

        let chosen = &compatible[rand::rng().random_range(0..compatible.len())];
        debug!(worker = chosen.name(), step = %identifier.name, "placing container");

        let container = chosen.create_container(identifier, spec).await?;
        metrics::CONTAINERS_CREATED_TOTAL.inc();
        Ok(container)
    }

    /// Opaque-handle lookup.
    pub async fn lookup_container(
        &self,
        handle: &Handle,
    ) -> Result<Option<Arc<dyn Container>>, FleetError> {
        match self.provider.find_container_by_handle(handle).await? {
            Some(record) => self.resolve(record).await,
            None => Ok(None),
        }
    }

    /// Logical-key lookup.
    pub async fn find_container_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Arc<dyn Container>>, FleetError> {
        match self
            .provider
            .find_container_for_identifier(identifier)
            .await?
        {
            Some(record) => self.resolve(record).await,
            None => Ok(None),
        }
    }

    /// Resolve a store record into a live container. A record whose worker
    /// the host no longer recognizes is stale; the record is reaped and the
    /// container reported as absent, not as an error.
    async fn resolve(
        &self,
        record: ContainerRecord,
    ) -> Result<Option<Arc<dyn Container>>, FleetError> {
        let worker = match self.provider.get_worker(&record.worker_name).await? {
            Some(worker) => worker,
            None => return Err(FleetError::MissingWorker),
        };

        match worker.lookup_container(&record.handle).await? {
            Some(container) => Ok(Some(container)),
            None => {
                info!(
                    handle = %record.handle,
                    worker = %record.worker_name,
                    "reaping record for a handle the worker no longer knows"
                );
                self.provider.reap_container(&record.handle).await?;
                Ok(None)
            }
        }
    }
}
