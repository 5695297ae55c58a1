//! Serial-group admission: per-job parallelism limits.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use conveyor_core::build::JobConfig;
use conveyor_db::BuildStore;

use crate::StarterError;

/// Decides whether a pending build must keep waiting on its serial groups.
#[async_trait]
pub trait MaxInFlightUpdater: Send + Sync {
    /// Returns true when `build_id` may not start yet: either the groups
    /// are at capacity, or the build is not at the head of the line.
    async fn update_max_in_flight_reached(
        &self,
        job: &JobConfig,
        build_id: i64,
    ) -> Result<bool, StarterError>;
}

/// Database-backed throttle. Admission is FIFO by pending-build order: only
/// the oldest pending build across the serial-group set may proceed, and
/// only while fewer than the cap are running.
pub struct SerialGroupThrottle {
    store: Arc<dyn BuildStore>,
}

impl SerialGroupThrottle {
    pub fn new(store: Arc<dyn BuildStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MaxInFlightUpdater for SerialGroupThrottle {
    async fn update_max_in_flight_reached(
        &self,
        job: &JobConfig,
        build_id: i64,
    ) -> Result<bool, StarterError> {
        let max_in_flight = job.effective_max_in_flight();
        if max_in_flight == 0 {
            return Ok(false);
        }

        let groups = job.effective_serial_groups();

        let running = self
            .store
            .running_builds_by_serial_group(&job.name, &groups)
            .await?;
        if running.len() >= max_in_flight {
            self.store.set_max_in_flight_reached(&job.name, true).await?;
            return Ok(true);
        }

        let next_pending = self
            .store
            .next_pending_build_by_serial_group(&job.name, &groups)
            .await?;
        let Some(next_pending) = next_pending else {
            // The build was cancelled or consumed between the two queries.
            // Do not race it; the next tick sees a consistent view.
            info!(job = %job.name, build = build_id, "pending-build-disappeared-from-serial-group");
            return Ok(true);
        };

        Ok(next_pending.id != build_id)
    }
}
