//! Picks pending builds, consults the throttle, and launches the admitted
//! ones.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use conveyor_core::build::{Build, BuildStatus, JobConfig};
use conveyor_core::metrics;
use conveyor_db::BuildStore;

use crate::max_in_flight::MaxInFlightUpdater;
use crate::StarterError;

/// Drives an admitted build: containers via the pool, execution via the
/// resource runner. Behind a trait so the starter can be exercised without
/// a fleet.
#[async_trait]
pub trait BuildLauncher: Send + Sync {
    async fn launch(&self, build: &Build, job: &JobConfig) -> Result<(), StarterError>;
}

/// One scheduler tick: walk each job's pending builds FIFO and start
/// whatever the throttle admits.
pub struct BuildStarter {
    store: Arc<dyn BuildStore>,
    throttle: Arc<dyn MaxInFlightUpdater>,
    launcher: Arc<dyn BuildLauncher>,
}

impl BuildStarter {
    pub fn new(
        store: Arc<dyn BuildStore>,
        throttle: Arc<dyn MaxInFlightUpdater>,
        launcher: Arc<dyn BuildLauncher>,
    ) -> Self {
        Self {
            store,
            throttle,
            launcher,
        }
    }

    pub async fn try_start_pending_builds(&self, jobs: &[JobConfig]) -> Result<(), StarterError> {
        for job in jobs {
            self.try_start_job(job).await?;
        }
        Ok(())
    }

    async fn try_start_job(&self, job: &JobConfig) -> Result<(), StarterError> {
        let pending = self.store.pending_builds(&job.name).await?;

        for build in pending {
            let reached = self
                .throttle
                .update_max_in_flight_reached(job, build.id)
                .await?;

            if reached {
                // Not an error: the build stays pending and this job's line
                // is blocked behind it.
                debug!(job = %job.name, build = build.id, "max in flight reached; leaving builds pending");
                break;
            }

            if !self.store.start_build(build.id).await? {
                debug!(build = build.id, "build was claimed elsewhere");
                continue;
            }

            metrics::BUILDS_STARTED_TOTAL.inc();
            info!(job = %job.name, build = build.id, "starting build");
            if let Err(err) = self.launcher.launch(&build, job).await {
                error!(build = build.id, error = %err, "build launch failed");
                self.store
                    .finish_build(build.id, BuildStatus::Errored)
                    .await?;
            }
        }

        Ok(())
    }
}
