//! Route assembly.

pub mod health;
pub mod workers;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use conveyor_core::metrics;

use crate::{auth, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .route("/metrics", get(|| async { metrics::render() }))
        .nest("/api/v1/workers", workers::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::attach_claims,
        ))
        .with_state(state)
}
