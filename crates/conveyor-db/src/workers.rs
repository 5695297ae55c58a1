//! Worker registry: durable directory of execution hosts with TTL liveness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;

use conveyor_core::worker::{ResourceType, WorkerInfo};

use crate::{DbError, DbResult};

/// The registry owns worker records. Registration is an upsert keyed by
/// name; a worker that stops heartbeating past its TTL drops out of every
/// query, and the sweep deletes the row.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Upsert a worker. `None` TTL persists without expiry; a positive TTL
    /// evicts the worker after that duration of silence. Returns the name
    /// the worker was saved under.
    async fn save_worker(&self, info: WorkerInfo, ttl: Option<Duration>) -> DbResult<String>;

    /// All workers currently considered live.
    async fn workers(&self) -> DbResult<Vec<WorkerInfo>>;

    async fn get_worker(&self, name: &str) -> DbResult<Option<WorkerInfo>>;

    /// Delete rows whose TTL has lapsed. Returns how many were removed.
    async fn prune_expired(&self) -> DbResult<u64>;
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    name: String,
    container_host_addr: String,
    volume_host_addr: Option<String>,
    http_proxy_url: Option<String>,
    https_proxy_url: Option<String>,
    no_proxy: Option<String>,
    active_containers: i32,
    resource_types: Json<Vec<ResourceType>>,
    platform: String,
    tags: Json<Vec<String>>,
    team_id: i64,
    start_time: i64,
}

impl From<WorkerRow> for WorkerInfo {
    fn from(row: WorkerRow) -> Self {
        WorkerInfo {
            name: row.name,
            container_host_addr: row.container_host_addr,
            volume_host_addr: row.volume_host_addr,
            http_proxy_url: row.http_proxy_url,
            https_proxy_url: row.https_proxy_url,
            no_proxy: row.no_proxy,
            active_containers: row.active_containers,
            resource_types: row.resource_types.0,
            platform: row.platform,
            tags: row.tags.0,
            team_id: row.team_id,
            start_time: row.start_time,
        }
    }
}

const LIVE: &str = "(expires_at IS NULL OR expires_at > NOW())";

/// PostgreSQL implementation of the worker registry.
pub struct PgWorkerRegistry {
    pool: PgPool,
}

impl PgWorkerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn save_worker(&self, info: WorkerInfo, ttl: Option<Duration>) -> DbResult<String> {
        if info.name.is_empty() {
            return Err(DbError::Corrupt("worker name must not be empty".to_string()));
        }

        let expires_at: Option<DateTime<Utc>> = ttl.map(|ttl| Utc::now() + ttl);

        sqlx::query(
            r#"
            INSERT INTO workers (
                name, container_host_addr, volume_host_addr,
                http_proxy_url, https_proxy_url, no_proxy,
                active_containers, resource_types, platform, tags,
                team_id, start_time, registered_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), $13)
            ON CONFLICT (name) DO UPDATE SET
                container_host_addr = EXCLUDED.container_host_addr,
                volume_host_addr = EXCLUDED.volume_host_addr,
                http_proxy_url = EXCLUDED.http_proxy_url,
                https_proxy_url = EXCLUDED.https_proxy_url,
                no_proxy = EXCLUDED.no_proxy,
                active_containers = EXCLUDED.active_containers,
                resource_types = EXCLUDED.resource_types,
                platform = EXCLUDED.platform,
                tags = EXCLUDED.tags,
                team_id = EXCLUDED.team_id,
                start_time = EXCLUDED.start_time,
                registered_at = NOW(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&info.name)
        .bind(&info.container_host_addr)
        .bind(&info.volume_host_addr)
        .bind(&info.http_proxy_url)
        .bind(&info.https_proxy_url)
        .bind(&info.no_proxy)
        .bind(info.active_containers)
        .bind(Json(&info.resource_types))
        .bind(&info.platform)
        .bind(Json(&info.tags))
        .bind(info.team_id)
        .bind(info.start_time)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(info.name)
    }

    async fn workers(&self) -> DbResult<Vec<WorkerInfo>> {
        let rows = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT name, container_host_addr, volume_host_addr, http_proxy_url, \
             https_proxy_url, no_proxy, active_containers, resource_types, platform, \
             tags, team_id, start_time FROM workers WHERE {LIVE} ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WorkerInfo::from).collect())
    }

    async fn get_worker(&self, name: &str) -> DbResult<Option<WorkerInfo>> {
        let row = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT name, container_host_addr, volume_host_addr, http_proxy_url, \
             https_proxy_url, no_proxy, active_containers, resource_types, platform, \
             tags, team_id, start_time FROM workers WHERE name = $1 AND {LIVE}"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WorkerInfo::from))
    }

    async fn prune_expired(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM workers WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            tracing::info!(count = result.rows_affected(), "pruned expired workers");
        }
        Ok(result.rows_affected())
    }
}
