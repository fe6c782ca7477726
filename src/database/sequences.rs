//! Durable id sequences.
//!
//! Process instance and work item ids are allocated from `id_sequences` inside
//! the caller's transaction, so they are unique across every session sharing
//! the database and an aborted attempt gives its ids back.

use sqlx::{Executor, Sqlite};

/// Allocate the next value of the named sequence, starting at 1
pub async fn next_value<'e, E>(executor: E, name: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO id_sequences (name, value) VALUES (?1, 1)
        ON CONFLICT (name) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(executor)
    .await
}

/// Last value handed out by the named sequence, 0 if none yet
pub async fn current_value<'e, E>(executor: E, name: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: Option<i64> = sqlx::query_scalar("SELECT value FROM id_sequences WHERE name = ?1")
        .bind(name)
        .fetch_optional(executor)
        .await?;

    Ok(value.unwrap_or(0))
}
