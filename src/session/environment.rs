//! Bindings a session needs to persist itself.
//!
//! An [`Environment`] pairs the session store with the transaction manager
//! that scopes every state-changing operation. Both must share one pool so
//! that session state and handler writes land in the same transaction.

use sqlx::SqlitePool;
use tracing::info;

use super::store::SessionStore;
use crate::config::{ConfigurationError, DatabaseConfig};
use crate::database::{DatabaseConnection, DatabaseMigrations, TransactionManager};
use crate::error::Result;
use crate::models::BusinessEntityIndex;

pub const STORE_BINDING: &str = "session_store";
pub const TRANSACTION_MANAGER_BINDING: &str = "transaction_manager";

#[derive(Debug, Clone)]
pub struct Environment {
    store: SessionStore,
    transactions: TransactionManager,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Environment with both bindings on one pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            store: SessionStore::new(pool.clone()),
            transactions: TransactionManager::new(pool),
        }
    }

    /// Open the database, bring its schema up to date and bind to it
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let connection = DatabaseConnection::connect(config).await?;
        DatabaseMigrations::run_all(connection.pool()).await?;
        info!(url = %config.url, "Session environment ready");
        Ok(Self::from_pool(connection.pool().clone()))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn pool(&self) -> &SqlitePool {
        self.transactions.pool()
    }

    /// Business entity index over the same database
    pub fn index(&self) -> BusinessEntityIndex {
        BusinessEntityIndex::new(self.pool().clone())
    }
}

#[derive(Debug, Default)]
pub struct EnvironmentBuilder {
    store: Option<SessionStore>,
    transactions: Option<TransactionManager>,
}

impl EnvironmentBuilder {
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transaction_manager(mut self, transactions: TransactionManager) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn build(self) -> Result<Environment> {
        let store = self
            .store
            .ok_or_else(|| ConfigurationError::missing_binding(STORE_BINDING))?;
        let transactions = self
            .transactions
            .ok_or_else(|| ConfigurationError::missing_binding(TRANSACTION_MANAGER_BINDING))?;

        Ok(Environment {
            store,
            transactions,
        })
    }
}
