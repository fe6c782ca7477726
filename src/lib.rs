#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Process Sessions
//!
//! Durable business-process sessions that suspend at external work items,
//! persist their whole execution state, and are later reloaded by id and
//! resumed.
//!
//! ## Overview
//!
//! A session runs process instances compiled from small YAML definitions.
//! When an instance reaches a task, the registered [`ExternalTaskHandler`]
//! records where it stopped (the [`IndexingTaskHandler`] writes a
//! [`BusinessEntity`] row) and the session persists. Any process can later
//! find the entity by business key or work item id, reload the session and
//! complete the work item, deactivating the entity in the same transaction.
//!
//! ## Module Organization
//!
//! - [`definitions`] - Process and rule documents compiled into a knowledge base
//! - [`session`] - Session state, store, runtime and the session handle
//! - [`work_items`] - Work items, the handler contract, registry and manager
//! - [`models`] - The business entity index
//! - [`orchestration`] - Lifecycle manager and completion coordinator
//! - [`database`] - Connection pool, migrations, sequences and transaction scopes
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use process_sessions::config::DatabaseConfig;
//! use process_sessions::definitions::{DefinitionResource, KnowledgeBaseTable, Record, ResourceType};
//! use process_sessions::orchestration::{CompletionCoordinator, SessionLifecycleManager};
//! use process_sessions::session::Environment;
//! use process_sessions::work_items::IndexingTaskHandler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = Environment::connect(&DatabaseConfig::with_url("sqlite://data/sessions.db")).await?;
//! let manager = SessionLifecycleManager::new(env.clone());
//! let mut kbases = KnowledgeBaseTable::new();
//!
//! let resources = vec![DefinitionResource::from_path(
//!     "resources/process-async-interactions.yaml",
//!     ResourceType::Process,
//! )];
//! let mut session = manager.create_session(&mut kbases, "orders", resources).await?;
//! session.register_handler_for(
//!     ["Human Task", "External Service Call"],
//!     Arc::new(IndexingTaskHandler::with_key("order-42")),
//! )?;
//!
//! let mut variables = process_sessions::definitions::Variables::new();
//! variables.insert("person".into(), Record::new("Person").with("name", "Salaboy").into());
//! session.start_process("com.salaboy.process.AsyncInteractions", variables).await?;
//! let session_id = session.id();
//! manager.dispose(&mut session)?;
//!
//! // Later, possibly in another process
//! let entity = env.index().find_active_by_key("order-42").await?;
//! let mut session = manager.load_session(session_id, kbases.require("orders")?).await?;
//! session.register_handler_for(
//!     ["Human Task", "External Service Call"],
//!     Arc::new(IndexingTaskHandler::with_key("order-42")),
//! )?;
//! let outcome = CompletionCoordinator::new(env).complete(session, &entity, None).await?;
//! println!("committed {}", outcome.transaction_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod definitions;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod session;
pub mod work_items;

pub use config::{ConfigManager, DatabaseConfig, EngineConfig, SessionConfig};
pub use constants::{ProcessInstanceStatus, WorkItemState};
pub use definitions::{
    DefinitionResource, KnowledgeBase, KnowledgeBaseTable, KnowledgeBuilder, Record,
    ResourceType, VariableValue, Variables,
};
pub use error::{CompletionStage, Diagnostic, Result, SessionError};
pub use models::{BusinessEntity, BusinessEntityIndex};
pub use orchestration::{CompletionCoordinator, CompletionOutcome, SessionLifecycleManager};
pub use session::{Environment, FactHandle, SessionStore, StatefulSession};
pub use work_items::{
    ExternalTaskHandler, HandlerContext, IndexingTaskHandler, WorkItem, WorkItemCompletion,
    WorkItemManager,
};
