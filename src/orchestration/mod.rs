//! # Orchestration
//!
//! Caller-facing coordination on top of sessions:
//!
//! - [`SessionLifecycleManager`]: compile definitions, create, reload and
//!   dispose sessions
//! - [`CompletionCoordinator`]: complete a work item and deactivate its
//!   business entity in one transaction

pub mod completion_coordinator;
pub mod lifecycle_manager;

pub use completion_coordinator::{CompletionCoordinator, CompletionOutcome};
pub use lifecycle_manager::SessionLifecycleManager;
