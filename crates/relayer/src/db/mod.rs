//! Postgres persistence. One `Database` wrapping a `PgPool`, one repository module per
//! entity, grounded on the indexer crate's `database.rs` in the reference pack (plain
//! `sqlx::query!`/`query_as!`, `sqlx::migrate!` run once at startup).

pub mod allocations;
pub mod checkbooks;
pub mod polling_tasks;
pub mod withdraw_requests;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Readiness check (§ supplemented `/ready` endpoint): the pool must accept a
    /// trivial query.
    pub async fn is_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
