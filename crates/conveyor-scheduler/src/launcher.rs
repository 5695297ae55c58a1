//! The production launcher: containers from the pool, execution through
//! the resource runner.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use conveyor_core::build::{Build, BuildStatus, JobConfig};
use conveyor_core::container::{ContainerSpec, Identifier, ResourceContainerSpec};
use conveyor_core::runtime::Volume;
use conveyor_core::worker::WorkerSpec;
use conveyor_core::Handle;
use conveyor_db::BuildStore;
use conveyor_fleet::{FleetError, Pool, WorkerProvider};
use conveyor_resource::{IoConfig, Resource};

use crate::abort::AbortBus;
use crate::starter::BuildLauncher;
use crate::StarterError;

/// Fetches every input of the job's config, reusing an existing container
/// for the step when one is still alive, and records the build's outcome.
pub struct ResourceLauncher {
    pool: Arc<Pool>,
    provider: Arc<dyn WorkerProvider>,
    store: Arc<dyn BuildStore>,
    aborts: Arc<AbortBus>,
}

impl ResourceLauncher {
    pub fn new(
        pool: Arc<Pool>,
        provider: Arc<dyn WorkerProvider>,
        store: Arc<dyn BuildStore>,
        aborts: Arc<AbortBus>,
    ) -> Self {
        Self {
            pool,
            provider,
            store,
            aborts,
        }
    }

    /// A volume on the worker that owns the container.
    async fn volume_for(&self, handle: &Handle) -> Result<Arc<dyn Volume>, StarterError> {
        let record = self
            .provider
            .find_container_by_handle(handle)
            .await?
            .ok_or(FleetError::MissingWorker)?;
        let worker = self
            .provider
            .get_worker(&record.worker_name)
            .await?
            .ok_or(FleetError::MissingWorker)?;
        Ok(worker.create_volume(handle).await?)
    }
}

#[async_trait]
impl BuildLauncher for ResourceLauncher {
    async fn launch(&self, build: &Build, job: &JobConfig) -> Result<(), StarterError> {
        for input in &job.inputs {
            let identifier = Identifier {
                name: input.name.clone(),
                job_name: Some(job.name.clone()),
                build_id: Some(build.id),
                worker_name: None,
            };

            let spec = ContainerSpec::Resource(ResourceContainerSpec {
                resource_type: input.resource_type.clone(),
                source: input.source.clone(),
                params: input.params.clone(),
                version: input.version.clone(),
                worker: WorkerSpec {
                    tags: input.tags.clone(),
                    team_id: job.team_id,
                    ..WorkerSpec::default()
                },
            });

            // Reattach to the step's container when one survives; only
            // create when there is nothing to resume.
            let container = match self.pool.find_container_for_identifier(&identifier).await? {
                Some(container) => container,
                None => self.pool.create_container(&identifier, &spec).await?,
            };

            let volume = self.volume_for(container.handle()).await?;
            let signals = self.aborts.register(build.id);
            let (ready, _ready_rx) = oneshot::channel();

            let resource = Resource::new(container);
            let fetched = resource
                .fetch(
                    volume,
                    IoConfig::default(),
                    &input.source,
                    &input.params,
                    input.version.as_ref(),
                    signals,
                    ready,
                )
                .await;
            self.aborts.deregister(build.id);

            match fetched {
                Ok(fetched) => {
                    info!(
                        build = build.id,
                        input = %input.name,
                        version = ?fetched.version(),
                        "fetched input"
                    );
                }
                Err(err) if err.is_aborted() => {
                    info!(build = build.id, input = %input.name, "build aborted");
                    self.store
                        .finish_build(build.id, BuildStatus::Aborted)
                        .await?;
                    return Ok(());
                }
                Err(err) => {
                    warn!(build = build.id, input = %input.name, error = %err, "input fetch failed");
                    self.store
                        .finish_build(build.id, BuildStatus::Failed)
                        .await?;
                    return Ok(());
                }
            }
        }

        self.store
            .finish_build(build.id, BuildStatus::Succeeded)
            .await?;
        Ok(())
    }
}
