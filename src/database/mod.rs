//! # Database Operations
//!
//! SQLite storage layer shared by the session store and the business entity
//! index.
//!
//! ## Key Components
//!
//! - [`connection`] - Bounded connection pool construction and health checks
//! - [`migrations`] - Embedded, versioned schema migrations
//! - [`sequences`] - Durable id allocation for process instances and work items
//! - [`transaction`] - Transaction scopes that roll back unless committed
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use process_sessions::config::DatabaseConfig;
//! use process_sessions::database::{DatabaseConnection, DatabaseMigrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::with_url("sqlite://data/sessions.db")).await?;
//! DatabaseMigrations::run_all(db.pool()).await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;
pub mod sequences;
pub mod transaction;

pub use connection::DatabaseConnection;
pub use migrations::DatabaseMigrations;
pub use transaction::{Savepoint, TransactionManager, TransactionScope};
