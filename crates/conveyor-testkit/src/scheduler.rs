//! Fakes for the scheduler traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use conveyor_core::build::{Build, JobConfig};
use conveyor_db::DbError;
use conveyor_scheduler::{BuildLauncher, MaxInFlightUpdater, StarterError};

/// A scripted throttle. Verdicts are canned per build id; unseeded builds
/// are admitted.
#[derive(Default)]
pub struct FakeThrottle {
    reached: Mutex<HashMap<i64, bool>>,
    error: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, i64)>>,
}

impl FakeThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reached(&self, build_id: i64, reached: bool) {
        self.reached.lock().insert(build_id, reached);
    }

    pub fn set_error(&self, message: &str) {
        *self.error.lock() = Some(message.to_string());
    }

    /// `(job_name, build_id)` for each verdict requested.
    pub fn calls(&self) -> Vec<(String, i64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MaxInFlightUpdater for FakeThrottle {
    async fn update_max_in_flight_reached(
        &self,
        job: &JobConfig,
        build_id: i64,
    ) -> Result<bool, StarterError> {
        self.calls.lock().push((job.name.clone(), build_id));
        if let Some(message) = self.error.lock().clone() {
            return Err(StarterError::Db(DbError::Unavailable(message)));
        }
        Ok(self.reached.lock().get(&build_id).copied().unwrap_or(false))
    }
}

/// A scripted launcher recording which builds it was handed.
#[derive(Default)]
pub struct FakeLauncher {
    launched: Mutex<Vec<i64>>,
    error: Mutex<Option<String>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&self, message: &str) {
        *self.error.lock() = Some(message.to_string());
    }

    pub fn launched(&self) -> Vec<i64> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl BuildLauncher for FakeLauncher {
    async fn launch(&self, build: &Build, _job: &JobConfig) -> Result<(), StarterError> {
        self.launched.lock().push(build.id);
        match self.error.lock().clone() {
            Some(message) => Err(StarterError::Db(DbError::Unavailable(message))),
            None => Ok(()),
        }
    }
}
