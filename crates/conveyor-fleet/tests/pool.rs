use std::sync::Arc;

use conveyor_core::container::{ContainerSpec, Identifier, ResourceContainerSpec};
use conveyor_core::worker::{WorkerMismatch, WorkerSpec};
use conveyor_core::Handle;
use conveyor_db::{ContainerRecord, DbError};
use conveyor_fleet::{FleetError, Pool};
use conveyor_testkit::containers::FakeContainer;
use conveyor_testkit::workers::{FakeWorker, FakeWorkerProvider, LookupBehavior};

fn unwrap_err<T>(result: Result<T, FleetError>) -> FleetError {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(err) => err,
    }
}

fn resource_spec() -> ContainerSpec {
    ContainerSpec::Resource(ResourceContainerSpec {
        resource_type: "git".to_string(),
        ..ResourceContainerSpec::default()
    })
}

fn identifier() -> Identifier {
    Identifier {
        name: "some-step".to_string(),
        ..Identifier::default()
    }
}

fn record(handle: &str, worker: &str) -> ContainerRecord {
    ContainerRecord {
        handle: Handle::from(handle),
        worker_name: worker.to_string(),
        identifier: identifier(),
    }
}

#[tokio::test]
async fn create_spreads_randomly_over_satisfying_workers() {
    let worker_a = Arc::new(FakeWorker::new("worker-a"));
    let worker_b = Arc::new(FakeWorker::new("worker-b"));
    let worker_c = Arc::new(FakeWorker::new("worker-c"));
    worker_c.set_satisfying(Err(WorkerMismatch::MismatchedTags));

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_workers(vec![worker_a.clone(), worker_b.clone(), worker_c.clone()]);

    let pool = Pool::new(provider);

    for _ in 0..100 {
        pool.create_container(&identifier(), &resource_spec())
            .await
            .expect("create should succeed");
    }

    let a = worker_a.create_count() as i64;
    let b = worker_b.create_count() as i64;
    assert_eq!(worker_c.create_count(), 0);
    assert_eq!(a + b, 100);
    assert!((a - b).abs() <= 50, "distribution too skewed: a={a} b={b}");
}

#[tokio::test]
async fn create_checks_every_worker_against_the_folded_spec() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_workers(vec![worker.clone()]);

    let pool = Pool::new(provider);
    pool.create_container(&identifier(), &resource_spec())
        .await
        .unwrap();

    let checked = worker.satisfying_args();
    assert_eq!(checked.len(), 1);
    assert_eq!(
        checked[0],
        WorkerSpec {
            resource_type: Some("git".to_string()),
            ..WorkerSpec::default()
        }
    );
}

#[tokio::test]
async fn create_with_empty_fleet_is_no_workers() {
    let provider = Arc::new(FakeWorkerProvider::new());
    let pool = Pool::new(provider);

    let err = unwrap_err(pool.create_container(&identifier(), &resource_spec()).await);
    assert!(matches!(err, FleetError::NoWorkers));
}

#[tokio::test]
async fn create_with_no_satisfying_worker_reports_the_examined_set() {
    let worker_a = Arc::new(FakeWorker::new("worker-a"));
    let worker_b = Arc::new(FakeWorker::new("worker-b"));
    worker_a.set_satisfying(Err(WorkerMismatch::MismatchedTags));
    worker_b.set_satisfying(Err(WorkerMismatch::ForeignTeam));

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_workers(vec![worker_a, worker_b]);

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.create_container(&identifier(), &resource_spec()).await);

    match err {
        FleetError::NoCompatibleWorkers { spec, workers } => {
            assert_eq!(spec.resource_type.as_deref(), Some("git"));
            assert_eq!(workers, vec!["worker-a", "worker-b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn create_propagates_provider_errors() {
    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_workers_error("registry down");

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.create_container(&identifier(), &resource_spec()).await);
    assert!(matches!(err, FleetError::Db(DbError::Unavailable(_))));
}

#[tokio::test]
async fn create_surfaces_the_chosen_workers_error() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_create_error("runtime refused");

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_workers(vec![worker]);

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.create_container(&identifier(), &resource_spec()).await);
    assert!(matches!(err, FleetError::Runtime(_)));
}

#[tokio::test]
async fn lookup_propagates_store_errors() {
    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_find_by_handle_error("disaster");

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.lookup_container(&Handle::from("some-handle")).await);
    assert!(matches!(err, FleetError::Db(DbError::Unavailable(_))));
}

#[tokio::test]
async fn lookup_of_unknown_handle_is_absent_not_an_error() {
    let provider = Arc::new(FakeWorkerProvider::new());
    let pool = Pool::new(provider.clone());

    let found = pool
        .lookup_container(&Handle::from("some-handle"))
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(provider.reap_calls().len(), 0);
}

#[tokio::test]
async fn lookup_with_vanished_worker_is_missing_worker() {
    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_by_handle(record("some-handle", "gone-worker"));

    let pool = Pool::new(provider.clone());
    let err = unwrap_err(pool.lookup_container(&Handle::from("some-handle")).await);
    assert!(matches!(err, FleetError::MissingWorker));
    assert_eq!(provider.get_worker_calls(), vec!["gone-worker"]);
}

#[tokio::test]
async fn lookup_propagates_worker_lookup_errors() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_lookup(LookupBehavior::Error("disaster".to_string()));

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_by_handle(record("some-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker);

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.lookup_container(&Handle::from("some-handle")).await);
    assert!(matches!(err, FleetError::Runtime(_)));
}

#[tokio::test]
async fn lookup_of_stale_handle_reaps_the_record() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_lookup(LookupBehavior::NotFound);

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_by_handle(record("some-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker);

    let pool = Pool::new(provider.clone());
    let found = pool
        .lookup_container(&Handle::from("some-handle"))
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(provider.reap_calls(), vec![Handle::from("some-handle")]);
}

#[tokio::test]
async fn lookup_surfaces_reap_failures() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_lookup(LookupBehavior::NotFound);

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_by_handle(record("some-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker);
    provider.set_reap_error("nope");

    let pool = Pool::new(provider);
    let err = unwrap_err(pool.lookup_container(&Handle::from("some-handle")).await);
    assert!(matches!(err, FleetError::Db(DbError::Unavailable(_))));
}

#[tokio::test]
async fn lookup_returns_the_workers_container() {
    let container = Arc::new(FakeContainer::with_handle("some-handle"));
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_container(container);

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_by_handle(record("some-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker.clone());

    let pool = Pool::new(provider);
    let found = pool
        .lookup_container(&Handle::from("some-handle"))
        .await
        .unwrap()
        .expect("container should be found");

    assert_eq!(found.handle(), &Handle::from("some-handle"));
    assert_eq!(worker.lookup_args(), vec![Handle::from("some-handle")]);
}

#[tokio::test]
async fn find_for_identifier_resolves_through_the_recorded_worker() {
    let container = Arc::new(FakeContainer::with_handle("recorded-handle"));
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_container(container);

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_for_identifier(record("recorded-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker.clone());

    let pool = Pool::new(provider.clone());
    let found = pool
        .find_container_for_identifier(&identifier())
        .await
        .unwrap()
        .expect("container should be found");

    assert_eq!(found.handle(), &Handle::from("recorded-handle"));
    assert_eq!(provider.find_by_identifier_calls(), vec![identifier()]);
    // The worker is asked for the recorded handle, not the identifier.
    assert_eq!(worker.lookup_args(), vec![Handle::from("recorded-handle")]);
}

#[tokio::test]
async fn find_for_identifier_misses_cleanly() {
    let provider = Arc::new(FakeWorkerProvider::new());
    let pool = Pool::new(provider);

    let found = pool
        .find_container_for_identifier(&identifier())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn find_for_identifier_reaps_stale_records() {
    let worker = Arc::new(FakeWorker::new("worker-a"));
    worker.set_lookup(LookupBehavior::NotFound);

    let provider = Arc::new(FakeWorkerProvider::new());
    provider.set_container_for_identifier(record("recorded-handle", "worker-a"));
    provider.set_get_worker("worker-a", worker);

    let pool = Pool::new(provider.clone());
    let found = pool
        .find_container_for_identifier(&identifier())
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(provider.reap_calls(), vec![Handle::from("recorded-handle")]);
}
