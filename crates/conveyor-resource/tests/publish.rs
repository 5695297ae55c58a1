//! Publish (`/opt/resource/out`) behavior. The state machine is shared
//! with fetch; these pin the publish-specific surface.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use conveyor_core::resource::{Params, Source};
use conveyor_core::runtime::ProcessSpec;
use conveyor_resource::{IoConfig, Resource, ResourceError, PROCESS_PROPERTY, RESULT_PROPERTY};
use conveyor_testkit::containers::{FakeContainer, FakeProcess, FakeVolume};

const RESPONSE: &str = r#"{"version": {"ref": "published"}, "metadata": []}"#;

fn source() -> Source {
    serde_json::json!({"uri": "git://repo"})
        .as_object()
        .unwrap()
        .clone()
}

fn params() -> Params {
    serde_json::json!({"from": "output"})
        .as_object()
        .unwrap()
        .clone()
}

async fn publish(
    container: &Arc<FakeContainer>,
    volume: &Arc<FakeVolume>,
) -> Result<conveyor_resource::VersionedSource, ResourceError> {
    let resource = Resource::new(container.clone());
    let (_signals_tx, signals) = mpsc::channel(1);
    let (ready, _ready_rx) = oneshot::channel();
    resource
        .publish(
            volume.clone(),
            IoConfig::default(),
            &source(),
            &params(),
            None,
            signals,
            ready,
        )
        .await
}

#[tokio::test]
async fn fresh_run_spawns_the_out_script() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let published = publish(&container, &volume)
        .await
        .expect("publish should succeed");

    assert_eq!(
        container.runs(),
        vec![ProcessSpec {
            path: "/opt/resource/out".to_string(),
            args: vec!["/tmp/build/put".to_string()],
            ..ProcessSpec::default()
        }]
    );
    assert_eq!(
        published.version(),
        &HashMap::from([("ref".to_string(), "published".to_string())])
    );

    // No version in the request when publishing without one.
    let stdin = container.stdin_writes();
    let request: serde_json::Value = serde_json::from_slice(&stdin[0]).unwrap();
    assert_eq!(
        request,
        serde_json::json!({
            "source": {"uri": "git://repo"},
            "params": {"from": "output"}
        })
    );

    assert_eq!(
        container.property_writes(),
        vec![
            (PROCESS_PROPERTY.to_string(), "process-id".to_string()),
            (RESULT_PROPERTY.to_string(), RESPONSE.to_string()),
        ]
    );
}

#[tokio::test]
async fn memoized_publish_runs_nothing() {
    let container = Arc::new(FakeContainer::new());
    container.set_property_value(RESULT_PROPERTY, RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let published = publish(&container, &volume)
        .await
        .expect("publish should succeed");

    assert_eq!(
        published.version(),
        &HashMap::from([("ref".to_string(), "published".to_string())])
    );
    assert_eq!(container.runs().len(), 0);
    assert_eq!(container.attaches().len(), 0);
}

#[tokio::test]
async fn streams_resolve_under_the_put_tree() {
    let container = Arc::new(FakeContainer::new());
    container.set_process(FakeProcess::exiting("process-id", 0));
    container.set_script_stdout(RESPONSE);
    let volume = Arc::new(FakeVolume::new());

    let published = publish(&container, &volume)
        .await
        .expect("publish should succeed");

    published.stream_out("artifacts").await.unwrap();
    assert_eq!(volume.stream_outs(), vec!["/tmp/build/put/artifacts"]);
}
