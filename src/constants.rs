//! # System Constants
//!
//! Names, defaults and status enums shared by every component of the session
//! engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation names used in structured log records
pub mod events {
    // Session lifecycle
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_LOADED: &str = "session.loaded";
    pub const SESSION_SAVED: &str = "session.saved";
    pub const SESSION_DISPOSED: &str = "session.disposed";

    // Process instances
    pub const PROCESS_STARTED: &str = "process.started";
    pub const PROCESS_COMPLETED: &str = "process.completed";
    pub const PROCESS_ABORTED: &str = "process.aborted";
    pub const RULE_FIRED: &str = "rule.fired";

    // Work items
    pub const WORK_ITEM_STARTED: &str = "work_item.started";
    pub const WORK_ITEM_COMPLETED: &str = "work_item.completed";
    pub const WORK_ITEM_ABORTED: &str = "work_item.aborted";

    // Business entity index
    pub const ENTITY_RECORDED: &str = "entity.recorded";
    pub const ENTITY_DEACTIVATED: &str = "entity.deactivated";

    // Completion transactions
    pub const COMPLETION_COMMITTED: &str = "completion.committed";
    pub const COMPLETION_ROLLED_BACK: &str = "completion.rolled_back";
}

/// Task type served by human task handlers
pub const HUMAN_TASK: &str = "Human Task";

/// Task type served by external service handlers
pub const EXTERNAL_SERVICE_CALL_TASK: &str = "External Service Call";

/// Durable sequence names
pub mod sequences {
    pub const PROCESS_INSTANCE: &str = "process_instance";
    pub const WORK_ITEM: &str = "work_item";
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/process-sessions.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 3;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// File names searched for in the configuration directory
pub const CONFIG_FILE_NAMES: [&str; 2] = ["process-sessions.yaml", "process-sessions.yml"];

/// Environment variables consulted, in order, to pick the active environment
pub const ENVIRONMENT_VARIABLES: [&str; 2] = ["PROCESS_SESSIONS_ENV", "APP_ENV"];

/// Environment sections recognised in the configuration file
pub const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Lifecycle of a process instance held in session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessInstanceStatus {
    /// Executing between suspension points
    Active,
    /// Waiting on an external work item
    Suspended,
    Completed,
    Aborted,
}

impl ProcessInstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for ProcessInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl FromStr for ProcessInstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid process instance status: {s}")),
        }
    }
}

/// Lifecycle of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    Pending,
    Completed,
    Aborted,
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl FromStr for WorkItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid work item state: {s}")),
        }
    }
}
