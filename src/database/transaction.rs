//! # Transaction Scopes
//!
//! A [`TransactionScope`] is one unit of work against the session database. It
//! owns a pooled connection for its whole lifetime and hands it back on every
//! exit path: `commit`, `rollback`, or drop. Dropping a scope that was never
//! committed rolls it back.
//!
//! Savepoints mark a point inside an open scope that a single failed step can
//! be undone to without discarding the rest of the caller's work.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Coordinator handle that opens transaction scopes on the shared pool
#[derive(Debug, Clone)]
pub struct TransactionManager {
    pool: SqlitePool,
}

impl TransactionManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a new transaction scope
    pub async fn begin(&self) -> Result<TransactionScope> {
        let tx = self.pool.begin().await?;
        let scope = TransactionScope {
            id: Uuid::new_v4(),
            tx: Some(tx),
            started_at: Instant::now(),
            savepoints: 0,
        };

        debug!(transaction_id = %scope.id, "Transaction scope opened");
        Ok(scope)
    }
}

/// An open transaction plus the id it is reported under
pub struct TransactionScope {
    id: Uuid,
    tx: Option<Transaction<'static, Sqlite>>,
    started_at: Instant,
    savepoints: u32,
}

/// A savepoint opened by [`TransactionScope::savepoint`]
#[derive(Debug)]
#[must_use = "a savepoint should be released or rolled back to"]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TransactionScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connection enlisted in this transaction
    pub fn connection(&mut self) -> &mut SqliteConnection {
        match self.tx.as_mut() {
            Some(tx) => &mut **tx,
            // `tx` is only taken by `commit`/`rollback`, which consume `self`
            None => unreachable!("transaction scope used after completion"),
        }
    }

    /// Open a savepoint at the current point of the transaction
    pub async fn savepoint(&mut self) -> Result<Savepoint> {
        let name = format!("sp_{}", self.savepoints + 1);
        let sql = format!("SAVEPOINT {name}");
        sqlx::query(&sql).execute(self.connection()).await?;
        self.savepoints += 1;
        Ok(Savepoint { name })
    }

    /// Keep everything written since the savepoint
    pub async fn release(&mut self, savepoint: Savepoint) -> Result<()> {
        let sql = format!("RELEASE SAVEPOINT {}", savepoint.name);
        sqlx::query(&sql).execute(self.connection()).await?;
        Ok(())
    }

    /// Undo everything written since the savepoint. The transaction stays
    /// open with whatever was written before it.
    pub async fn rollback_to(&mut self, savepoint: Savepoint) -> Result<()> {
        let undo = format!("ROLLBACK TO SAVEPOINT {}", savepoint.name);
        sqlx::query(&undo).execute(self.connection()).await?;
        let release = format!("RELEASE SAVEPOINT {}", savepoint.name);
        sqlx::query(&release).execute(self.connection()).await?;
        debug!(transaction_id = %self.id, savepoint = %savepoint.name, "Rolled back to savepoint");
        Ok(())
    }

    pub async fn commit(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(
                transaction_id = %self.id,
                duration_ms = self.started_at.elapsed().as_millis() as u64,
                "Transaction committed"
            );
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!(transaction_id = %self.id, "Transaction rolled back");
        }
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx queues the rollback when the inner transaction drops
            warn!(transaction_id = %self.id, "Transaction scope dropped without commit; rolling back");
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("open", &self.tx.is_some())
            .finish()
    }
}
