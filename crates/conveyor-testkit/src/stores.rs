//! Fakes for the persistence traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use conveyor_core::build::{Build, BuildStatus, JobConfig};
use conveyor_core::container::Identifier;
use conveyor_core::worker::WorkerInfo;
use conveyor_core::Handle;
use conveyor_db::{
    BuildStore, ContainerRecord, ContainerStore, DbError, DbResult, Team, TeamStore,
    WorkerRegistry,
};

fn unavailable(message: &Option<String>) -> Option<DbError> {
    message.clone().map(DbError::Unavailable)
}

/// A scripted build store.
#[derive(Default)]
pub struct FakeBuildStore {
    next_id: Mutex<i64>,
    builds: Mutex<HashMap<i64, Build>>,
    pending: Mutex<Vec<Build>>,
    pending_error: Mutex<Option<String>>,
    running: Mutex<Vec<Build>>,
    running_error: Mutex<Option<String>>,
    running_queries: Mutex<Vec<(String, Vec<String>)>>,
    next_pending: Mutex<Option<Build>>,
    next_pending_error: Mutex<Option<String>>,
    start_results: Mutex<HashMap<i64, bool>>,
    start_calls: Mutex<Vec<i64>>,
    start_error: Mutex<Option<String>>,
    finish_calls: Mutex<Vec<(i64, BuildStatus)>>,
    reached_calls: Mutex<Vec<(String, bool)>>,
    reached_error: Mutex<Option<String>>,
    registered_jobs: Mutex<Vec<JobConfig>>,
}

impl FakeBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pending build with the given id, for seeding canned results.
    pub fn pending_build(id: i64, job_name: &str) -> Build {
        Build {
            id,
            name: id.to_string(),
            job_name: job_name.to_string(),
            status: BuildStatus::Pending,
            start_time: None,
            end_time: None,
        }
    }

    /// A started build with the given id, for seeding canned results.
    pub fn started_build(id: i64, job_name: &str) -> Build {
        Build {
            status: BuildStatus::Started,
            ..Self::pending_build(id, job_name)
        }
    }

    pub fn set_pending_builds(&self, builds: Vec<Build>) {
        *self.pending.lock() = builds;
    }

    pub fn set_pending_error(&self, message: &str) {
        *self.pending_error.lock() = Some(message.to_string());
    }

    pub fn set_running_builds(&self, builds: Vec<Build>) {
        *self.running.lock() = builds;
    }

    pub fn set_running_error(&self, message: &str) {
        *self.running_error.lock() = Some(message.to_string());
    }

    pub fn set_next_pending(&self, build: Option<Build>) {
        *self.next_pending.lock() = build;
    }

    pub fn set_next_pending_error(&self, message: &str) {
        *self.next_pending_error.lock() = Some(message.to_string());
    }

    pub fn set_start_result(&self, id: i64, started: bool) {
        self.start_results.lock().insert(id, started);
    }

    pub fn set_start_error(&self, message: &str) {
        *self.start_error.lock() = Some(message.to_string());
    }

    pub fn set_reached_error(&self, message: &str) {
        *self.reached_error.lock() = Some(message.to_string());
    }

    pub fn start_calls(&self) -> Vec<i64> {
        self.start_calls.lock().clone()
    }

    pub fn finish_calls(&self) -> Vec<(i64, BuildStatus)> {
        self.finish_calls.lock().clone()
    }

    pub fn reached_calls(&self) -> Vec<(String, bool)> {
        self.reached_calls.lock().clone()
    }

    /// `(job_name, serial_groups)` for each running-builds query.
    pub fn running_queries(&self) -> Vec<(String, Vec<String>)> {
        self.running_queries.lock().clone()
    }

    pub fn registered_jobs(&self) -> Vec<JobConfig> {
        self.registered_jobs.lock().clone()
    }
}

#[async_trait]
impl BuildStore for FakeBuildStore {
    async fn create_build(&self, job_name: &str) -> DbResult<Build> {
        let mut next_id = self.next_id.lock();
        *next_id += 1;
        let build = Self::pending_build(*next_id, job_name);
        self.builds.lock().insert(build.id, build.clone());
        Ok(build)
    }

    async fn get_build(&self, id: i64) -> DbResult<Option<Build>> {
        Ok(self.builds.lock().get(&id).cloned())
    }

    async fn pending_builds(&self, job_name: &str) -> DbResult<Vec<Build>> {
        if let Some(err) = unavailable(&self.pending_error.lock()) {
            return Err(err);
        }
        Ok(self
            .pending
            .lock()
            .iter()
            .filter(|b| b.job_name == job_name)
            .cloned()
            .collect())
    }

    async fn start_build(&self, id: i64) -> DbResult<bool> {
        self.start_calls.lock().push(id);
        if let Some(err) = unavailable(&self.start_error.lock()) {
            return Err(err);
        }
        Ok(self.start_results.lock().get(&id).copied().unwrap_or(true))
    }

    async fn finish_build(&self, id: i64, status: BuildStatus) -> DbResult<()> {
        self.finish_calls.lock().push((id, status));
        Ok(())
    }

    async fn register_job(&self, job: &JobConfig) -> DbResult<()> {
        self.registered_jobs.lock().push(job.clone());
        Ok(())
    }

    async fn running_builds_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> DbResult<Vec<Build>> {
        self.running_queries
            .lock()
            .push((job_name.to_string(), serial_groups.to_vec()));
        if let Some(err) = unavailable(&self.running_error.lock()) {
            return Err(err);
        }
        Ok(self.running.lock().clone())
    }

    async fn next_pending_build_by_serial_group(
        &self,
        _job_name: &str,
        _serial_groups: &[String],
    ) -> DbResult<Option<Build>> {
        if let Some(err) = unavailable(&self.next_pending_error.lock()) {
            return Err(err);
        }
        Ok(self.next_pending.lock().clone())
    }

    async fn set_max_in_flight_reached(&self, job_name: &str, reached: bool) -> DbResult<()> {
        self.reached_calls
            .lock()
            .push((job_name.to_string(), reached));
        match unavailable(&self.reached_error.lock()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A scripted worker registry.
#[derive(Default)]
pub struct FakeRegistry {
    workers: Mutex<Vec<WorkerInfo>>,
    save_calls: Mutex<Vec<(WorkerInfo, Option<Duration>)>>,
    save_error: Mutex<Option<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workers(&self, workers: Vec<WorkerInfo>) {
        *self.workers.lock() = workers;
    }

    pub fn set_save_error(&self, message: &str) {
        *self.save_error.lock() = Some(message.to_string());
    }

    pub fn save_calls(&self) -> Vec<(WorkerInfo, Option<Duration>)> {
        self.save_calls.lock().clone()
    }
}

#[async_trait]
impl WorkerRegistry for FakeRegistry {
    async fn save_worker(&self, info: WorkerInfo, ttl: Option<Duration>) -> DbResult<String> {
        self.save_calls.lock().push((info.clone(), ttl));
        if let Some(err) = unavailable(&self.save_error.lock()) {
            return Err(err);
        }
        let name = info.name.clone();
        let mut workers = self.workers.lock();
        workers.retain(|w| w.name != info.name);
        workers.push(info);
        Ok(name)
    }

    async fn workers(&self) -> DbResult<Vec<WorkerInfo>> {
        Ok(self.workers.lock().clone())
    }

    async fn get_worker(&self, name: &str) -> DbResult<Option<WorkerInfo>> {
        Ok(self.workers.lock().iter().find(|w| w.name == name).cloned())
    }

    async fn prune_expired(&self) -> DbResult<u64> {
        Ok(0)
    }
}

/// A scripted container store.
#[derive(Default)]
pub struct FakeContainerStore {
    records: Mutex<Vec<ContainerRecord>>,
    create_error: Mutex<Option<String>>,
    reap_calls: Mutex<Vec<Handle>>,
}

impl FakeContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_create_error(&self, message: &str) {
        *self.create_error.lock() = Some(message.to_string());
    }

    pub fn records(&self) -> Vec<ContainerRecord> {
        self.records.lock().clone()
    }

    pub fn reap_calls(&self) -> Vec<Handle> {
        self.reap_calls.lock().clone()
    }
}

#[async_trait]
impl ContainerStore for FakeContainerStore {
    async fn create_container(&self, record: &ContainerRecord) -> DbResult<()> {
        if let Some(err) = unavailable(&self.create_error.lock()) {
            return Err(err);
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn find_by_handle(&self, handle: &Handle) -> DbResult<Option<ContainerRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| &r.handle == handle)
            .cloned())
    }

    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> DbResult<Option<ContainerRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| r.identifier.name == identifier.name)
            .cloned())
    }

    async fn reap_container(&self, handle: &Handle) -> DbResult<()> {
        self.reap_calls.lock().push(handle.clone());
        self.records.lock().retain(|r| &r.handle != handle);
        Ok(())
    }
}

/// A scripted team store.
#[derive(Default)]
pub struct FakeTeamStore {
    teams: Mutex<HashMap<String, Team>>,
    error: Mutex<Option<String>>,
}

impl FakeTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_team(&self, name: &str, id: i64) {
        self.teams.lock().insert(
            name.to_string(),
            Team {
                id,
                name: name.to_string(),
            },
        );
    }

    pub fn set_error(&self, message: &str) {
        *self.error.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl TeamStore for FakeTeamStore {
    async fn create_team(&self, name: &str) -> DbResult<Team> {
        if let Some(err) = unavailable(&self.error.lock()) {
            return Err(err);
        }
        let team = Team {
            id: (self.teams.lock().len() + 1) as i64,
            name: name.to_string(),
        };
        self.teams.lock().insert(name.to_string(), team.clone());
        Ok(team)
    }

    async fn get_team_by_name(&self, name: &str) -> DbResult<Option<Team>> {
        if let Some(err) = unavailable(&self.error.lock()) {
            return Err(err);
        }
        Ok(self.teams.lock().get(name).cloned())
    }
}
