//! Worker registration endpoint.

use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info, warn};

use conveyor_core::metrics;
use conveyor_core::worker::{ResourceType, WorkerInfo};

use crate::auth::AuthClaims;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(register_worker))
}

/// `POST /api/v1/workers?ttl=<duration>` request body.
#[derive(Debug, Deserialize)]
pub struct WorkerRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub garden_addr: String,
    #[serde(default)]
    pub baggageclaim_url: Option<String>,
    #[serde(default)]
    pub http_proxy_url: Option<String>,
    #[serde(default)]
    pub https_proxy_url: Option<String>,
    #[serde(default)]
    pub no_proxy: Option<String>,
    #[serde(default)]
    pub active_containers: i32,
    #[serde(default)]
    pub resource_types: Vec<ResourceType>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub start_time: i64,
}

#[derive(Debug, Deserialize)]
struct RegisterQuery {
    ttl: Option<String>,
}

async fn register_worker(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
    claims: Option<Extension<AuthClaims>>,
    Json(registration): Json<WorkerRegistration>,
) -> Result<StatusCode, ApiError> {
    let claims = claims.map(|Extension(claims)| claims).unwrap_or_default();
    if !claims.system {
        return Err(ApiError::Forbidden(
            "worker registration requires system credentials".to_string(),
        ));
    }

    let team_id = if registration.team.is_empty() {
        0
    } else {
        match state.teams.get_team_by_name(&registration.team).await {
            Ok(Some(team)) => team.id,
            Ok(None) => {
                warn!(team = %registration.team, "worker registration names an unknown team");
                return Err(ApiError::BadRequest("team not found".to_string()));
            }
            Err(err) => {
                error!(error = %err, "failed to look up team");
                return Err(ApiError::Internal("failed to look up team".to_string()));
            }
        }
    };

    if registration.garden_addr.is_empty() {
        return Err(ApiError::BadRequest("missing address".to_string()));
    }

    let ttl = match query.ttl.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            humantime::parse_duration(raw)
                .map_err(|_| ApiError::BadRequest("malformed ttl".to_string()))?,
        ),
    };

    let name = if registration.name.is_empty() {
        registration.garden_addr.clone()
    } else {
        registration.name.clone()
    };

    metrics::WORKER_ACTIVE_CONTAINERS
        .with_label_values(&[name.as_str()])
        .set(f64::from(registration.active_containers));
    metrics::WORKER_REGISTRATIONS_TOTAL
        .with_label_values(&[name.as_str()])
        .inc();
    info!(
        worker = %name,
        active_containers = registration.active_containers,
        platform = %registration.platform,
        "registering worker"
    );

    let info = WorkerInfo {
        name,
        container_host_addr: registration.garden_addr,
        volume_host_addr: registration.baggageclaim_url,
        http_proxy_url: registration.http_proxy_url,
        https_proxy_url: registration.https_proxy_url,
        no_proxy: registration.no_proxy,
        active_containers: registration.active_containers,
        resource_types: registration.resource_types,
        platform: registration.platform,
        tags: registration.tags,
        team_id,
        start_time: registration.start_time,
    };

    if let Err(err) = state.registry.save_worker(info, ttl).await {
        error!(error = %err, "failed to save worker");
        return Err(ApiError::Internal("failed to save worker".to_string()));
    }

    Ok(StatusCode::OK)
}
