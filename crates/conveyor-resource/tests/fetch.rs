//! Fetch (`/opt/resource/in`) behavior: memoization, reattach, fresh spawn,
//! stderr forwarding, stream layout, and abort.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use conveyor_core::io::SharedBuffer;
use conveyor_core::resource::{MetadataField, Params, Source, Version};
use conveyor_core::runtime::{ProcessSpec, Signal};
use conveyor_resource::{
    IoConfig, Resource, ResourceError, VersionedSource, PROCESS_PROPERTY, RESULT_PROPERTY,
};
use conveyor_testkit::containers::{FakeContainer, FakeProcess, FakeVolume};

const RESPONSE: &str = r#"{
    "version": {"some": "new-version"},
    "metadata": [
        {"name": "a", "value": "a-value"},
        {"name": "b", "value": "b-value"}
    ]
}"#;

fn source() -> Source {
    serde_json::json!({"some": "source"})
        .as_object()
        .unwrap()
        .clone()
}

fn params() -> Params {
    serde_json::json!({"some": "params"})
        .as_object()
        .unwrap()
        .clone()
}

fn version() -> Version {
    HashMap::from([("some".to_string(), "version".to_string())])
}

fn expected_metadata() -> Vec<MetadataField> {
    vec![
        MetadataField {
            name: "a".to_string(),
            value: "a-value".to_string(),
        },
        MetadataField {
            name: "b".to_string(),
            value: "b-value".to_string(),
        },
    ]
}

async fn fetch(
    container: &Arc<FakeContainer>,
    volume: &Arc<FakeVolume>,
    io: IoConfig,
) -> Result<VersionedSource, ResourceError> {
    let resource = Resource::new(container.clone());
    let (_signals_tx, signals) = mpsc::channel(1);
    let (ready, _ready_rx) = oneshot::channel();
    resource
        .fetch(
            volume.clone(),
            io,
            &source(),
            &params(),
            Some(&version()),
            signals,
            ready,
        )
        .await
}

#[tokio::test]
async fn memoized_result_short_circuits_execution() {
    let container = Arc::new(FakeContainer::new());
    container.set_property_value(RESULT_PROPERTY, RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let fetched = fetch(&container, &volume, IoConfig::default())
        .await
        .expect("fetch should succeed");

    assert_eq!(
        fetched.version(),
        &HashMap::from([("some".to_string(), "new-version".to_string())])
    );
    assert_eq!(fetched.metadata(), expected_metadata());
    assert_eq!(container.runs().len(), 0);
    assert_eq!(container.attaches().len(), 0);
}

#[tokio::test]
async fn memoized_fetch_is_idempotent() {
    let container = Arc::new(FakeContainer::new());
    container.set_property_value(RESULT_PROPERTY, RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let first = fetch(&container, &volume, IoConfig::default()).await.unwrap();
    let second = fetch(&container, &volume, IoConfig::default()).await.unwrap();

    assert_eq!(first.version(), second.version());
    assert_eq!(first.metadata(), second.metadata());
    assert_eq!(container.runs().len(), 0);
    assert_eq!(container.property_writes().len(), 0);
}

#[tokio::test]
async fn reattaches_to_a_persisted_process() {
    let container = Arc::new(FakeContainer::new());
    container.set_property_value(PROCESS_PROPERTY, "process-id");
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let fetched = fetch(&container, &volume, IoConfig::default())
        .await
        .expect("fetch should succeed");

    assert_eq!(container.attaches(), vec!["process-id"]);
    assert_eq!(container.runs().len(), 0);
    assert_eq!(
        fetched.version(),
        &HashMap::from([("some".to_string(), "new-version".to_string())])
    );

    // The request rides stdin even on reattach, in case the script has not
    // consumed it yet.
    let stdin = container.stdin_writes();
    assert_eq!(stdin.len(), 1);
    let request: serde_json::Value = serde_json::from_slice(&stdin[0]).unwrap();
    assert_eq!(
        request,
        serde_json::json!({
            "source": {"some": "source"},
            "params": {"some": "params"},
            "version": {"some": "version"}
        })
    );

    // Only the result is written; the process id was already there.
    assert_eq!(
        container.property_writes(),
        vec![(RESULT_PROPERTY.to_string(), RESPONSE.to_string())]
    );
}

#[tokio::test]
async fn reattached_process_exiting_nonzero_fails_with_the_status() {
    let container = Arc::new(FakeContainer::new());
    container.set_property_value(PROCESS_PROPERTY, "process-id");
    container.set_process(FakeProcess::exiting("process-id", 9));
    container.set_script_stderr("it all went wrong");
    let volume = Arc::new(FakeVolume::new());

    let err = fetch(&container, &volume, IoConfig::default())
        .await
        .expect_err("fetch should fail");

    assert!(matches!(err, ResourceError::ScriptFailed(_)));
    assert!(err.to_string().contains("exit status 9"));
    assert!(err.to_string().contains("it all went wrong"));
}

#[tokio::test]
async fn fresh_run_spawns_the_in_script_with_the_request_on_stdin() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    fetch(&container, &volume, IoConfig::default())
        .await
        .expect("fetch should succeed");

    assert_eq!(
        container.runs(),
        vec![ProcessSpec {
            path: "/opt/resource/in".to_string(),
            args: vec!["/tmp/build/get".to_string()],
            ..ProcessSpec::default()
        }]
    );
    assert_eq!(container.attaches().len(), 0);

    let stdin = container.stdin_writes();
    assert_eq!(stdin.len(), 1);
    let request: serde_json::Value = serde_json::from_slice(&stdin[0]).unwrap();
    assert_eq!(
        request,
        serde_json::json!({
            "source": {"some": "source"},
            "params": {"some": "params"},
            "version": {"some": "version"}
        })
    );
}

#[tokio::test]
async fn fresh_run_persists_process_id_then_result_verbatim() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    fetch(&container, &volume, IoConfig::default())
        .await
        .expect("fetch should succeed");

    // Process id first (before the wait), then the exact stdout bytes —
    // whitespace and all, never a re-serialization.
    assert_eq!(
        container.property_writes(),
        vec![
            (PROCESS_PROPERTY.to_string(), "process-id".to_string()),
            (RESULT_PROPERTY.to_string(), RESPONSE.to_string()),
        ]
    );
}

#[tokio::test]
async fn stderr_is_forwarded_to_the_callers_sink() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    container.set_script_stderr("some stderr data");
    let volume = Arc::new(FakeVolume::new());

    let stderr = SharedBuffer::new();
    let io = IoConfig {
        stdout: None,
        stderr: Some(stderr.sink()),
    };

    fetch(&container, &volume, io).await.expect("fetch should succeed");

    assert_eq!(stderr.to_string_lossy(), "some stderr data");
}

#[tokio::test]
async fn stream_operations_share_the_operations_tree() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout("{}");
    let volume = Arc::new(FakeVolume::new());

    let fetched = fetch(&container, &volume, IoConfig::default())
        .await
        .expect("fetch should succeed");

    fetched
        .stream_in("a/path", Bytes::from_static(b"tarball"))
        .await
        .unwrap();
    fetched.stream_out("a/path").await.unwrap();

    let ins = volume.stream_ins();
    assert_eq!(ins.len(), 1);
    assert_eq!(ins[0].0, "/tmp/build/get/a/path");
    assert_eq!(volume.stream_outs(), vec!["/tmp/build/get/a/path"]);
    assert_eq!(container.runs().len(), 1);
}

#[tokio::test]
async fn spawn_errors_propagate() {
    let container = Arc::new(FakeContainer::new());
    container.set_run_error("oh no!");
    let volume = Arc::new(FakeVolume::new());

    let err = fetch(&container, &volume, IoConfig::default())
        .await
        .expect_err("fetch should fail");
    assert!(matches!(err, ResourceError::Runtime(_)));
}

#[tokio::test]
async fn malformed_response_is_its_own_error() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout("not json at all");
    let volume = Arc::new(FakeVolume::new());

    let err = fetch(&container, &volume, IoConfig::default())
        .await
        .expect_err("fetch should fail");
    assert!(matches!(err, ResourceError::MalformedResponse(_)));
}

#[tokio::test]
async fn a_signal_stops_the_container_and_aborts() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::blocking("process-id"));
    let volume = Arc::new(FakeVolume::new());

    let resource = Resource::new(container.clone());
    let (signals_tx, signals) = mpsc::channel(1);
    let (ready, _ready_rx) = oneshot::channel();

    let task = tokio::spawn({
        let volume = volume.clone();
        async move {
            resource
                .fetch(
                    volume,
                    IoConfig::default(),
                    &source(),
                    &params(),
                    Some(&version()),
                    signals,
                    ready,
                )
                .await
        }
    });

    signals_tx.send(Signal::Interrupt).await.unwrap();

    let err = task.await.unwrap().expect_err("fetch should abort");
    assert!(err.is_aborted());

    // Graceful stop of the container, exactly once. The process itself is
    // never signalled; termination propagates from the container.
    assert_eq!(container.stops(), vec![false]);
}

#[tokio::test]
async fn abort_wins_even_when_the_stop_fails() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::blocking("process-id"));
    container.set_stop_error("gotta get away");
    let volume = Arc::new(FakeVolume::new());

    let resource = Resource::new(container.clone());
    let (signals_tx, signals) = mpsc::channel(1);
    let (ready, _ready_rx) = oneshot::channel();

    let task = tokio::spawn({
        let volume = volume.clone();
        async move {
            resource
                .fetch(
                    volume,
                    IoConfig::default(),
                    &source(),
                    &params(),
                    Some(&version()),
                    signals,
                    ready,
                )
                .await
        }
    });

    signals_tx.send(Signal::Interrupt).await.unwrap();

    let err = task.await.unwrap().expect_err("fetch should abort");
    assert!(err.is_aborted());
    assert_eq!(container.stops(), vec![false]);
}
