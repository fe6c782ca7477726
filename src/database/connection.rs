use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Open a bounded pool for the configured database.
    ///
    /// File databases run in WAL mode with foreign keys enforced. A private
    /// in-memory database lives only as long as its connection, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let in_memory = config.is_in_memory();
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }
        }

        let pool_options =
            SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds));
        let pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;

        info!(
            max_connections = if in_memory { 1 } else { config.max_connections },
            in_memory = in_memory,
            "Database pool ready"
        );

        Ok(Self { pool })
    }

    /// Connect with default pool settings
    pub async fn from_url(url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(&DatabaseConfig::with_url(url)).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool, sqlx::Error> {
        let health: i64 = sqlx::query_scalar("SELECT 1 AS health")
            .fetch_one(&self.pool)
            .await?;

        debug!(health = health, "Database health check");
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
