//! Build store: lifecycle transitions and serial-group queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use conveyor_core::build::{Build, BuildStatus, JobConfig};

use crate::{DbError, DbResult};

#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Create a pending build for a job. The build name is the next per-job
    /// build number.
    async fn create_build(&self, job_name: &str) -> DbResult<Build>;

    async fn get_build(&self, id: i64) -> DbResult<Option<Build>>;

    /// Pending builds for a job, oldest first.
    async fn pending_builds(&self, job_name: &str) -> DbResult<Vec<Build>>;

    /// Transition a pending build to started. Returns false when the build
    /// was no longer pending (another scheduler tick claimed it, or it was
    /// cancelled).
    async fn start_build(&self, id: i64) -> DbResult<bool>;

    /// Record a terminal status. Ending a build releases its slot in every
    /// serial group it belongs to, since the serial-group queries only see
    /// started builds.
    async fn finish_build(&self, id: i64, status: BuildStatus) -> DbResult<()>;

    /// Make the serial-group join table reflect the job's config.
    async fn register_job(&self, job: &JobConfig) -> DbResult<()>;

    /// Builds currently started across the given serial groups.
    async fn running_builds_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> DbResult<Vec<Build>>;

    /// Oldest pending build across the given serial groups, if any.
    async fn next_pending_build_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> DbResult<Option<Build>>;

    async fn set_max_in_flight_reached(&self, job_name: &str, reached: bool) -> DbResult<()>;
}

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: i64,
    name: String,
    job_name: String,
    status: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl TryFrom<BuildRow> for Build {
    type Error = DbError;

    fn try_from(row: BuildRow) -> Result<Self, Self::Error> {
        let status = BuildStatus::from_str(&row.status).map_err(DbError::Corrupt)?;
        Ok(Build {
            id: row.id,
            name: row.name,
            job_name: row.job_name,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

const COLUMNS: &str = "id, name, job_name, status, start_time, end_time";

/// PostgreSQL implementation of the build store.
pub struct PgBuildStore {
    pool: PgPool,
}

impl PgBuildStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildStore for PgBuildStore {
    async fn create_build(&self, job_name: &str) -> DbResult<Build> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO jobs (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(job_name)
            .execute(&mut *tx)
            .await?;

        // The row lock taken by the UPDATE serializes concurrent triggers
        // for the same job, keeping per-job build numbers dense and unique.
        let (number,): (i64,) = sqlx::query_as(
            "UPDATE jobs SET next_build_number = next_build_number + 1 \
             WHERE name = $1 RETURNING next_build_number",
        )
        .bind(job_name)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, BuildRow>(&format!(
            r#"
            INSERT INTO builds (name, job_name, status)
            VALUES ($1, $2, 'pending')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(number.to_string())
        .bind(job_name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get_build(&self, id: i64) -> DbResult<Option<Build>> {
        let row =
            sqlx::query_as::<_, BuildRow>(&format!("SELECT {COLUMNS} FROM builds WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Build::try_from).transpose()
    }

    async fn pending_builds(&self, job_name: &str) -> DbResult<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {COLUMNS} FROM builds WHERE job_name = $1 AND status = 'pending' ORDER BY id"
        ))
        .bind(job_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Build::try_from).collect()
    }

    async fn start_build(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE builds SET status = 'started', start_time = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn finish_build(&self, id: i64, status: BuildStatus) -> DbResult<()> {
        if !status.is_terminal() {
            return Err(DbError::Corrupt(format!(
                "finish_build called with non-terminal status {status}"
            )));
        }
        sqlx::query("UPDATE builds SET status = $2, end_time = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_job(&self, job: &JobConfig) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO jobs (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(&job.name)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM jobs_serial_groups WHERE job_name = $1")
            .bind(&job.name)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO jobs_serial_groups (job_name, serial_group) \
             SELECT $1, UNNEST($2::text[])",
        )
        .bind(&job.name)
        .bind(job.effective_serial_groups())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn running_builds_by_serial_group(
        &self,
        _job_name: &str,
        serial_groups: &[String],
    ) -> DbResult<Vec<Build>> {
        // The groups already scope the query; the job is one of their members.
        let rows = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT DISTINCT b.id, b.name, b.job_name, b.status, b.start_time, b.end_time
            FROM builds b
            JOIN jobs_serial_groups jsg ON jsg.job_name = b.job_name
            WHERE jsg.serial_group = ANY($1) AND b.status = 'started'
            ORDER BY b.id
            "#,
        )
        .bind(serial_groups)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Build::try_from).collect()
    }

    async fn next_pending_build_by_serial_group(
        &self,
        _job_name: &str,
        serial_groups: &[String],
    ) -> DbResult<Option<Build>> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT DISTINCT b.id, b.name, b.job_name, b.status, b.start_time, b.end_time
            FROM builds b
            JOIN jobs_serial_groups jsg ON jsg.job_name = b.job_name
            WHERE jsg.serial_group = ANY($1) AND b.status = 'pending'
            ORDER BY b.id
            LIMIT 1
            "#,
        )
        .bind(serial_groups)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Build::try_from).transpose()
    }

    async fn set_max_in_flight_reached(&self, job_name: &str, reached: bool) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (name, max_in_flight_reached) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET max_in_flight_reached = EXCLUDED.max_in_flight_reached
            "#,
        )
        .bind(job_name)
        .bind(reached)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
