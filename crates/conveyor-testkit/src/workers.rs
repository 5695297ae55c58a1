//! Fakes for the fleet traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use conveyor_core::container::{ContainerSpec, Identifier};
use conveyor_core::runtime::{Container, Volume};
use conveyor_core::worker::{WorkerMismatch, WorkerSpec};
use conveyor_core::{Handle, RuntimeError};
use conveyor_db::{ContainerRecord, DbError};
use conveyor_fleet::{FleetError, Worker, WorkerProvider};

use crate::containers::{FakeContainer, FakeVolume};

/// How a [`FakeWorker`] answers `lookup_container`.
#[derive(Debug, Clone)]
pub enum LookupBehavior {
    /// Return the configured container (absent when none is configured).
    Found,
    NotFound,
    Error(String),
}

/// A scripted worker.
pub struct FakeWorker {
    name: String,
    active_containers: Mutex<i32>,
    satisfying_result: Mutex<Result<(), WorkerMismatch>>,
    satisfying_args: Mutex<Vec<WorkerSpec>>,
    container: Mutex<Option<Arc<FakeContainer>>>,
    volume: Mutex<Option<Arc<FakeVolume>>>,
    create_error: Mutex<Option<String>>,
    create_args: Mutex<Vec<Identifier>>,
    lookup_behavior: Mutex<LookupBehavior>,
    lookup_args: Mutex<Vec<Handle>>,
}

impl FakeWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            active_containers: Mutex::new(0),
            satisfying_result: Mutex::new(Ok(())),
            satisfying_args: Mutex::new(Vec::new()),
            container: Mutex::new(None),
            volume: Mutex::new(None),
            create_error: Mutex::new(None),
            create_args: Mutex::new(Vec::new()),
            lookup_behavior: Mutex::new(LookupBehavior::Found),
            lookup_args: Mutex::new(Vec::new()),
        }
    }

    pub fn set_active_containers(&self, count: i32) {
        *self.active_containers.lock() = count;
    }

    pub fn set_satisfying(&self, result: Result<(), WorkerMismatch>) {
        *self.satisfying_result.lock() = result;
    }

    /// Returned from `create_container` and handle lookups.
    pub fn set_container(&self, container: Arc<FakeContainer>) {
        *self.container.lock() = Some(container);
    }

    pub fn set_volume(&self, volume: Arc<FakeVolume>) {
        *self.volume.lock() = Some(volume);
    }

    pub fn set_create_error(&self, message: &str) {
        *self.create_error.lock() = Some(message.to_string());
    }

    pub fn set_lookup(&self, behavior: LookupBehavior) {
        *self.lookup_behavior.lock() = behavior;
    }

    pub fn create_count(&self) -> usize {
        self.create_args.lock().len()
    }

    pub fn create_args(&self) -> Vec<Identifier> {
        self.create_args.lock().clone()
    }

    pub fn satisfying_args(&self) -> Vec<WorkerSpec> {
        self.satisfying_args.lock().clone()
    }

    pub fn lookup_args(&self) -> Vec<Handle> {
        self.lookup_args.lock().clone()
    }

    fn container_or_fresh(&self) -> Arc<FakeContainer> {
        self.container
            .lock()
            .get_or_insert_with(|| Arc::new(FakeContainer::new()))
            .clone()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn active_containers(&self) -> i32 {
        *self.active_containers.lock()
    }

    fn satisfying(&self, spec: &WorkerSpec) -> Result<(), WorkerMismatch> {
        self.satisfying_args.lock().push(spec.clone());
        self.satisfying_result.lock().clone()
    }

    async fn create_container(
        &self,
        identifier: &Identifier,
        _spec: &ContainerSpec,
    ) -> Result<Arc<dyn Container>, FleetError> {
        self.create_args.lock().push(identifier.clone());
        if let Some(message) = self.create_error.lock().clone() {
            return Err(FleetError::Runtime(RuntimeError::Host(message)));
        }
        Ok(self.container_or_fresh())
    }

    async fn lookup_container(
        &self,
        handle: &Handle,
    ) -> Result<Option<Arc<dyn Container>>, FleetError> {
        self.lookup_args.lock().push(handle.clone());
        match self.lookup_behavior.lock().clone() {
            LookupBehavior::Found => {
                Ok(self.container.lock().clone().map(|c| c as Arc<dyn Container>))
            }
            LookupBehavior::NotFound => Ok(None),
            LookupBehavior::Error(message) => {
                Err(FleetError::Runtime(RuntimeError::Host(message)))
            }
        }
    }

    async fn create_volume(&self, _container: &Handle) -> Result<Arc<dyn Volume>, FleetError> {
        Ok(self
            .volume
            .lock()
            .get_or_insert_with(|| Arc::new(FakeVolume::new()))
            .clone())
    }
}

/// A scripted worker provider.
#[derive(Default)]
pub struct FakeWorkerProvider {
    workers: Mutex<Vec<Arc<dyn Worker>>>,
    workers_error: Mutex<Option<String>>,
    get_worker_map: Mutex<HashMap<String, Arc<dyn Worker>>>,
    get_worker_error: Mutex<Option<String>>,
    get_worker_calls: Mutex<Vec<String>>,
    container_by_handle: Mutex<Option<ContainerRecord>>,
    find_by_handle_error: Mutex<Option<String>>,
    container_for_identifier: Mutex<Option<ContainerRecord>>,
    find_by_identifier_error: Mutex<Option<String>>,
    find_by_identifier_calls: Mutex<Vec<Identifier>>,
    reap_calls: Mutex<Vec<Handle>>,
    reap_error: Mutex<Option<String>>,
}

impl FakeWorkerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workers<W: Worker + 'static>(&self, workers: Vec<Arc<W>>) {
        *self.workers.lock() = workers
            .into_iter()
            .map(|w| w as Arc<dyn Worker>)
            .collect();
    }

    pub fn set_workers_error(&self, message: &str) {
        *self.workers_error.lock() = Some(message.to_string());
    }

    pub fn set_get_worker<W: Worker + 'static>(&self, name: &str, worker: Arc<W>) {
        self.get_worker_map
            .lock()
            .insert(name.to_string(), worker as Arc<dyn Worker>);
    }

    pub fn set_get_worker_error(&self, message: &str) {
        *self.get_worker_error.lock() = Some(message.to_string());
    }

    pub fn set_container_by_handle(&self, record: ContainerRecord) {
        *self.container_by_handle.lock() = Some(record);
    }

    pub fn set_find_by_handle_error(&self, message: &str) {
        *self.find_by_handle_error.lock() = Some(message.to_string());
    }

    pub fn set_container_for_identifier(&self, record: ContainerRecord) {
        *self.container_for_identifier.lock() = Some(record);
    }

    pub fn set_find_by_identifier_error(&self, message: &str) {
        *self.find_by_identifier_error.lock() = Some(message.to_string());
    }

    pub fn set_reap_error(&self, message: &str) {
        *self.reap_error.lock() = Some(message.to_string());
    }

    pub fn get_worker_calls(&self) -> Vec<String> {
        self.get_worker_calls.lock().clone()
    }

    pub fn find_by_identifier_calls(&self) -> Vec<Identifier> {
        self.find_by_identifier_calls.lock().clone()
    }

    pub fn reap_calls(&self) -> Vec<Handle> {
        self.reap_calls.lock().clone()
    }
}

#[async_trait]
impl WorkerProvider for FakeWorkerProvider {
    async fn workers(&self) -> Result<Vec<Arc<dyn Worker>>, FleetError> {
        if let Some(message) = self.workers_error.lock().clone() {
            return Err(FleetError::Db(DbError::Unavailable(message)));
        }
        Ok(self.workers.lock().clone())
    }

    async fn get_worker(&self, name: &str) -> Result<Option<Arc<dyn Worker>>, FleetError> {
        self.get_worker_calls.lock().push(name.to_string());
        if let Some(message) = self.get_worker_error.lock().clone() {
            return Err(FleetError::Db(DbError::Unavailable(message)));
        }
        Ok(self.get_worker_map.lock().get(name).cloned())
    }

    async fn find_container_by_handle(
        &self,
        _handle: &Handle,
    ) -> Result<Option<ContainerRecord>, FleetError> {
        if let Some(message) = self.find_by_handle_error.lock().clone() {
            return Err(FleetError::Db(DbError::Unavailable(message)));
        }
        Ok(self.container_by_handle.lock().clone())
    }

    async fn find_container_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<ContainerRecord>, FleetError> {
        self.find_by_identifier_calls.lock().push(identifier.clone());
        if let Some(message) = self.find_by_identifier_error.lock().clone() {
            return Err(FleetError::Db(DbError::Unavailable(message)));
        }
        Ok(self.container_for_identifier.lock().clone())
    }

    async fn reap_container(&self, handle: &Handle) -> Result<(), FleetError> {
        self.reap_calls.lock().push(handle.clone());
        match self.reap_error.lock().clone() {
            Some(message) => Err(FleetError::Db(DbError::Unavailable(message))),
            None => Ok(()),
        }
    }
}
