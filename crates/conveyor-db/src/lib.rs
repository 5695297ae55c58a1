//! Database layer for the Conveyor build service.
//!
//! Provides store traits and PostgreSQL implementations:
//! - worker registry with TTL-based liveness
//! - container records (which worker owns which handle)
//! - builds, serial-group queries, and job registration
//! - teams

pub mod builds;
pub mod containers;
pub mod error;
pub mod teams;
pub mod workers;

pub use builds::{BuildStore, PgBuildStore};
pub use containers::{ContainerRecord, ContainerStore, PgContainerStore};
pub use error::{DbError, DbResult};
pub use teams::{PgTeamStore, Team, TeamStore};
pub use workers::{PgWorkerRegistry, WorkerRegistry};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
