//! Prometheus metrics for the build pipeline.
//!
//! Metrics live in a crate-local registry gathered by the API's `/metrics`
//! route, so tests never trip over the process-global default registry.
//! Producers increment from wherever the event happens: the registration
//! endpoint, the scheduler, the worker pool.

use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

/// Registry backing the `/metrics` route.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Active-container count most recently declared by each worker at
/// registration. Advisory; refreshed on every heartbeat.
pub static WORKER_ACTIVE_CONTAINERS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let gauge = GaugeVec::new(
        Opts::new(
            "conveyor_worker_active_containers",
            "Active containers declared by each worker at registration",
        ),
        &["worker"],
    )
    .expect("conveyor_worker_active_containers metric creation failed");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("conveyor_worker_active_containers metric registration failed");
    gauge
});

/// Accepted worker registrations.
pub static WORKER_REGISTRATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "conveyor_worker_registrations_total",
            "Accepted worker registrations",
        ),
        &["worker"],
    )
    .expect("conveyor_worker_registrations_total metric creation failed");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("conveyor_worker_registrations_total metric registration failed");
    counter
});

/// Builds admitted by the throttle and moved to started.
pub static BUILDS_STARTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "conveyor_builds_started_total",
        "Builds admitted by the throttle and moved to started",
    )
    .expect("conveyor_builds_started_total metric creation failed");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("conveyor_builds_started_total metric registration failed");
    counter
});

/// Containers placed on workers by the pool.
pub static CONTAINERS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "conveyor_containers_created_total",
        "Containers placed on workers by the pool",
    )
    .expect("conveyor_containers_created_total metric creation failed");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("conveyor_containers_created_total metric registration failed");
    counter
});

/// Render the registry in the text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
