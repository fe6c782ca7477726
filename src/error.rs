//! Error types for the process session engine.
//!

use crate::config::ConfigurationError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// One problem found while compiling definition resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the resource the problem was found in
    pub resource: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.resource, self.message)
    }
}

/// Step of a work item completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStage {
    Begin,
    CompleteWorkItem,
    DeactivateEntity,
    Commit,
    Rollback,
}

impl fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::CompleteWorkItem => write!(f, "complete_work_item"),
            Self::DeactivateEntity => write!(f, "deactivate_entity"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Definition compile error: {} diagnostic(s): {}", .diagnostics.len(), join_diagnostics(.diagnostics))]
    DefinitionCompile { diagnostics: Vec<Diagnostic> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous result: {0}")]
    AmbiguousResult(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("State mismatch for session {session_id}: {reason}")]
    StateMismatch { session_id: i64, reason: String },

    #[error("Concurrent modification detected for session {session_id} (expected version {expected_version})")]
    ConcurrentModification {
        session_id: i64,
        expected_version: i64,
    },

    #[error("Transaction {transaction_id} rolled back during {stage}: {source}")]
    TransactionFailure {
        transaction_id: Uuid,
        stage: CompletionStage,
        source: Box<SessionError>,
    },

    #[error("Handler registration failed for task type '{task_type}': {reason}")]
    HandlerRegistration { task_type: String, reason: String },

    #[error("No handler registered for task type '{task_type}' in session {session_id}")]
    MissingHandler { task_type: String, session_id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SessionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn handler(reason: impl Into<String>) -> Self {
        Self::Handler(reason.into())
    }

    /// Diagnostics of a failed knowledge base build, empty for any other error
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::DefinitionCompile { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Whether this error, or the cause of a rolled back transaction, is a lookup miss
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::TransactionFailure { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
