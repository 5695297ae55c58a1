//! Application state.

use sqlx::PgPool;
use std::sync::Arc;

use conveyor_db::{PgTeamStore, PgWorkerRegistry, TeamStore, WorkerRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn WorkerRegistry>,
    pub teams: Arc<dyn TeamStore>,
    /// Shared token presented by workers; `None` disables registration.
    pub system_token: Option<String>,
}

impl AppState {
    pub fn new(pool: PgPool, system_token: Option<String>) -> Self {
        Self {
            registry: Arc::new(PgWorkerRegistry::new(pool.clone())),
            teams: Arc::new(PgTeamStore::new(pool)),
            system_token,
        }
    }

    /// Assemble state from explicit stores; the seam tests use.
    pub fn with_stores(
        registry: Arc<dyn WorkerRegistry>,
        teams: Arc<dyn TeamStore>,
        system_token: Option<String>,
    ) -> Self {
        Self {
            registry,
            teams,
            system_token,
        }
    }
}
