//! # Database Migration System
//!
//! Versioned schema migrations embedded in the binary and applied in order.
//!
//! Migration files live in `migrations/` and follow the
//! `YYYYMMDDHHMMSS_description.sql` convention. Applied versions are recorded
//! in `session_schema_migrations`, so running the migrations again only applies
//! what is outstanding. Each migration runs in its own transaction together
//! with its tracking row.

use sqlx::SqlitePool;
use std::collections::HashSet;
use std::time::Instant;
use tracing::info;

use crate::logging::log_database_operation;

/// Represents a single embedded migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: &'static str,
    /// Human-readable migration name
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20250101000001",
        name: "create session info",
        sql: include_str!("../../migrations/20250101000001_create_session_info.sql"),
    },
    Migration {
        version: "20250101000002",
        name: "create business entities",
        sql: include_str!("../../migrations/20250101000002_create_business_entities.sql"),
    },
    Migration {
        version: "20250101000003",
        name: "create id sequences",
        sql: include_str!("../../migrations/20250101000003_create_id_sequences.sql"),
    },
];

/// Manages database schema migrations.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all outstanding migrations in version order
    pub async fn run_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        let started = Instant::now();
        Self::ensure_migration_table(pool).await?;
        let applied = Self::get_applied_migrations(pool).await?;

        let mut applied_now = 0;
        for migration in MIGRATIONS {
            if applied.contains(migration.version) {
                continue;
            }

            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );

            let mut tx = pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO session_schema_migrations (version, name) VALUES (?1, ?2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            applied_now += 1;
        }

        log_database_operation(
            "migrate",
            Some("session_schema_migrations"),
            None,
            "up_to_date",
            Some(started.elapsed().as_millis() as u64),
            Some(&format!("applied={applied_now} total={}", MIGRATIONS.len())),
        );
        Ok(())
    }

    /// Every migration compiled into this build
    pub fn migrations() -> &'static [Migration] {
        MIGRATIONS
    }

    /// Ensure migration tracking table exists
    async fn ensure_migration_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS session_schema_migrations (
                version TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get list of applied migration versions
    pub async fn get_applied_migrations(pool: &SqlitePool) -> Result<HashSet<String>, sqlx::Error> {
        let versions: Vec<String> =
            sqlx::query_scalar("SELECT version FROM session_schema_migrations")
                .fetch_all(pool)
                .await?;

        Ok(versions.into_iter().collect())
    }
}
