use std::sync::Arc;

use conveyor_core::build::{BuildStatus, JobConfig};
use conveyor_db::DbError;
use conveyor_scheduler::BuildStarter;
use conveyor_testkit::{FakeBuildStore, FakeLauncher, FakeThrottle};

fn job(name: &str) -> JobConfig {
    JobConfig {
        name: name.to_string(),
        ..JobConfig::default()
    }
}

fn rig() -> (
    Arc<FakeBuildStore>,
    Arc<FakeThrottle>,
    Arc<FakeLauncher>,
    BuildStarter,
) {
    let store = Arc::new(FakeBuildStore::new());
    let throttle = Arc::new(FakeThrottle::new());
    let launcher = Arc::new(FakeLauncher::new());
    let starter = BuildStarter::new(store.clone(), throttle.clone(), launcher.clone());
    (store, throttle, launcher, starter)
}

#[tokio::test]
async fn admitted_builds_are_started_and_launched() {
    let (store, throttle, launcher, starter) = rig();
    store.set_pending_builds(vec![FakeBuildStore::pending_build(7, "some-job")]);

    starter.try_start_pending_builds(&[job("some-job")]).await.unwrap();

    assert_eq!(throttle.calls(), vec![("some-job".to_string(), 7)]);
    assert_eq!(store.start_calls(), vec![7]);
    assert_eq!(launcher.launched(), vec![7]);
    assert_eq!(store.finish_calls().len(), 0);
}

#[tokio::test]
async fn a_reached_verdict_leaves_the_build_pending() {
    let (store, throttle, launcher, starter) = rig();
    store.set_pending_builds(vec![
        FakeBuildStore::pending_build(7, "some-job"),
        FakeBuildStore::pending_build(9, "some-job"),
    ]);
    throttle.set_reached(7, true);

    starter.try_start_pending_builds(&[job("some-job")]).await.unwrap();

    // Head of line is blocked, so the rest of the line is not probed.
    assert_eq!(throttle.calls(), vec![("some-job".to_string(), 7)]);
    assert_eq!(store.start_calls().len(), 0);
    assert_eq!(launcher.launched().len(), 0);
}

#[tokio::test]
async fn throttle_errors_propagate() {
    let (store, throttle, _launcher, starter) = rig();
    store.set_pending_builds(vec![FakeBuildStore::pending_build(7, "some-job")]);
    throttle.set_error("disaster");

    let err = starter
        .try_start_pending_builds(&[job("some-job")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        conveyor_scheduler::StarterError::Db(DbError::Unavailable(_))
    ));
}

#[tokio::test]
async fn a_lost_claim_race_moves_to_the_next_build() {
    let (store, _throttle, launcher, starter) = rig();
    store.set_pending_builds(vec![
        FakeBuildStore::pending_build(7, "some-job"),
        FakeBuildStore::pending_build(9, "some-job"),
    ]);
    store.set_start_result(7, false);

    starter.try_start_pending_builds(&[job("some-job")]).await.unwrap();

    assert_eq!(store.start_calls(), vec![7, 9]);
    assert_eq!(launcher.launched(), vec![9]);
}

#[tokio::test]
async fn launcher_failures_mark_the_build_errored() {
    let (store, _throttle, launcher, starter) = rig();
    store.set_pending_builds(vec![FakeBuildStore::pending_build(7, "some-job")]);
    launcher.set_error("no workers");

    starter.try_start_pending_builds(&[job("some-job")]).await.unwrap();

    assert_eq!(launcher.launched(), vec![7]);
    assert_eq!(store.finish_calls(), vec![(7, BuildStatus::Errored)]);
}

#[tokio::test]
async fn every_job_gets_its_turn() {
    let (store, _throttle, launcher, starter) = rig();
    store.set_pending_builds(vec![
        FakeBuildStore::pending_build(7, "job-a"),
        FakeBuildStore::pending_build(8, "job-b"),
    ]);

    starter
        .try_start_pending_builds(&[job("job-a"), job("job-b")])
        .await
        .unwrap();

    assert_eq!(launcher.launched(), vec![7, 8]);
}

#[tokio::test]
async fn pending_query_errors_propagate() {
    let (store, _throttle, _launcher, starter) = rig();
    store.set_pending_error("disaster");

    let err = starter
        .try_start_pending_builds(&[job("some-job")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        conveyor_scheduler::StarterError::Db(DbError::Unavailable(_))
    ));
}
