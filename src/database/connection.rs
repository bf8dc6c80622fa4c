use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::config::{DatabaseConfig, LedgerConfig};
use crate::error::{CoreError, Result};

/// Owns the connection pool for one database.
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    /// Connect using pool sizing from the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(&config.url)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to connect to database", e))?;

        Ok(Self { pool })
    }

    /// Connect using `DATABASE_URL` and `LEDGER_*` environment overrides.
    pub async fn from_env() -> Result<Self> {
        let config = LedgerConfig::from_env()?;
        Self::connect(&config.database).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS health")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::from_sqlx("health check failed", e))?;

        let health: i32 = row
            .try_get("health")
            .map_err(|e| CoreError::from_sqlx("health check failed", e))?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
