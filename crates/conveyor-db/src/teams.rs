//! Team store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::DbResult;

/// A team in the system. Team id zero is reserved to mean "global" on
/// worker records and is never handed out here.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn create_team(&self, name: &str) -> DbResult<Team>;
    async fn get_team_by_name(&self, name: &str) -> DbResult<Option<Team>>;
}

/// PostgreSQL implementation of the team store.
pub struct PgTeamStore {
    pool: PgPool,
}

impl PgTeamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamStore for PgTeamStore {
    async fn create_team(&self, name: &str) -> DbResult<Team> {
        let team = sqlx::query_as::<_, Team>(
            "INSERT INTO teams (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(team)
    }

    async fn get_team_by_name(&self, name: &str) -> DbResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>("SELECT id, name FROM teams WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(team)
    }
}
