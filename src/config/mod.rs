//! # Engine Configuration
//!
//! YAML-based configuration for the session engine, with environment sections
//! (`development`, `test`, `production`) deep-merged over the base document.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use process_sessions::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let pool_size = manager.config().database.max_connections;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT_SECONDS, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE_URL,
    DEFAULT_MAX_CONNECTIONS, EXTERNAL_SERVICE_CALL_TASK, HUMAN_TASK,
};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring process-sessions.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Storage connection and pooling configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session and work item handler defaults
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Environment name the configuration was resolved for
    #[serde(default)]
    pub environment: String,
}

/// Durable storage configuration.
///
/// Every operation holds a pooled connection for the span of one transaction
/// and releases it on every exit path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL (`sqlite://path/to/sessions.db`, `sqlite::memory:`, or `${DATABASE_URL}`)
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout_seconds() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECONDS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Configuration pointing at the given URL with default pool settings
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Whether the URL names a private in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Session defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Business key recorded by the indexing handler when the caller supplies none
    #[serde(default)]
    pub default_business_key: Option<String>,

    /// Task type names the indexing handler is registered under
    #[serde(default = "default_handler_task_types")]
    pub handler_task_types: Vec<String>,
}

fn default_handler_task_types() -> Vec<String> {
    vec![HUMAN_TASK.to_string(), EXTERNAL_SERVICE_CALL_TASK.to_string()]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_business_key: None,
            handler_task_types: default_handler_task_types(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "database configuration",
            ));
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigurationError::invalid_value(
                "database.url",
                self.database.url.clone(),
                "only sqlite: URLs are supported",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.sessions.handler_task_types.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "sessions.handler_task_types",
                "session configuration",
            ));
        }

        if let Some(blank) = self
            .sessions
            .handler_task_types
            .iter()
            .find(|name| name.trim().is_empty())
        {
            return Err(ConfigurationError::invalid_value(
                "sessions.handler_task_types",
                blank.clone(),
                "task type names must not be blank",
            ));
        }

        Ok(())
    }
}
