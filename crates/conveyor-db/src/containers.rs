//! Container records: which worker owns which handle, and what it is for.
//!
//! The record is only a pointer; the container itself (and its property
//! bag) lives on the worker. A record whose worker is gone, or whose handle
//! the worker no longer recognizes, is stale and gets reaped.

use async_trait::async_trait;
use sqlx::PgPool;

use conveyor_core::container::Identifier;
use conveyor_core::Handle;

use crate::DbResult;

/// Persisted pointer to a container on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub handle: Handle,
    pub worker_name: String,
    pub identifier: Identifier,
}

#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn create_container(&self, record: &ContainerRecord) -> DbResult<()>;

    async fn find_by_handle(&self, handle: &Handle) -> DbResult<Option<ContainerRecord>>;

    /// Logical-key lookup. Matches on every field the identifier sets.
    async fn find_by_identifier(&self, identifier: &Identifier)
        -> DbResult<Option<ContainerRecord>>;

    /// Delete the persisted record of a container.
    async fn reap_container(&self, handle: &Handle) -> DbResult<()>;
}

#[derive(sqlx::FromRow)]
struct ContainerRow {
    handle: String,
    worker_name: String,
    step_name: String,
    job_name: Option<String>,
    build_id: Option<i64>,
}

impl From<ContainerRow> for ContainerRecord {
    fn from(row: ContainerRow) -> Self {
        ContainerRecord {
            handle: Handle::from(row.handle),
            identifier: Identifier {
                name: row.step_name,
                job_name: row.job_name,
                build_id: row.build_id,
                worker_name: Some(row.worker_name.clone()),
            },
            worker_name: row.worker_name,
        }
    }
}

/// PostgreSQL implementation of the container store.
pub struct PgContainerStore {
    pool: PgPool,
}

impl PgContainerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "handle, worker_name, step_name, job_name, build_id";

#[async_trait]
impl ContainerStore for PgContainerStore {
    async fn create_container(&self, record: &ContainerRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO containers (handle, worker_name, step_name, job_name, build_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(record.handle.as_str())
        .bind(&record.worker_name)
        .bind(&record.identifier.name)
        .bind(&record.identifier.job_name)
        .bind(record.identifier.build_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_handle(&self, handle: &Handle) -> DbResult<Option<ContainerRecord>> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {COLUMNS} FROM containers WHERE handle = $1"
        ))
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ContainerRecord::from))
    }

    async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> DbResult<Option<ContainerRecord>> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM containers
            WHERE step_name = $1
              AND ($2::text IS NULL OR job_name = $2)
              AND ($3::bigint IS NULL OR build_id = $3)
              AND ($4::text IS NULL OR worker_name = $4)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(&identifier.name)
        .bind(&identifier.job_name)
        .bind(identifier.build_id)
        .bind(&identifier.worker_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ContainerRecord::from))
    }

    async fn reap_container(&self, handle: &Handle) -> DbResult<()> {
        sqlx::query("DELETE FROM containers WHERE handle = $1")
            .bind(handle.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
