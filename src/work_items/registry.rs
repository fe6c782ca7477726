//! # Work Item Handler Registry
//!
//! Per-session mapping from task type to handler, validated against the task
//! types the session's knowledge base actually uses.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::handler::ExternalTaskHandler;
use crate::error::{Result, SessionError};

pub struct WorkItemHandlerRegistry {
    known_task_types: BTreeSet<String>,
    handlers: HashMap<String, Arc<dyn ExternalTaskHandler>>,
}

impl WorkItemHandlerRegistry {
    /// Registry accepting handlers for the given task types only
    pub fn new(known_task_types: BTreeSet<String>) -> Self {
        Self {
            known_task_types,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Fails on blank or unknown task types and when a
    /// handler is already registered for the type.
    pub fn register(
        &mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn ExternalTaskHandler>,
    ) -> Result<()> {
        let task_type = task_type.into();
        self.check(&task_type)?;

        info!(
            task_type = %task_type,
            handler = handler.handler_name(),
            "Registered work item handler"
        );
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    /// Register one handler for several task types. Nothing is registered
    /// unless every type passes validation.
    pub fn register_all<I, S>(&mut self, task_types: I, handler: Arc<dyn ExternalTaskHandler>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let task_types: Vec<String> = task_types.into_iter().map(Into::into).collect();

        let mut seen = BTreeSet::new();
        for task_type in &task_types {
            self.check(task_type)?;
            if !seen.insert(task_type.as_str()) {
                return Err(SessionError::HandlerRegistration {
                    task_type: task_type.clone(),
                    reason: "listed more than once".to_string(),
                });
            }
        }

        for task_type in task_types {
            self.register(task_type, handler.clone())?;
        }
        Ok(())
    }

    fn check(&self, task_type: &str) -> Result<()> {
        if task_type.trim().is_empty() {
            return Err(SessionError::HandlerRegistration {
                task_type: task_type.to_string(),
                reason: "task type must not be blank".to_string(),
            });
        }

        if !self.known_task_types.contains(task_type) {
            return Err(SessionError::HandlerRegistration {
                task_type: task_type.to_string(),
                reason: format!(
                    "no process in the knowledge base uses this task type (known: {})",
                    self.known_task_types
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        if let Some(existing) = self.handlers.get(task_type) {
            return Err(SessionError::HandlerRegistration {
                task_type: task_type.to_string(),
                reason: format!("handler {} is already registered", existing.handler_name()),
            });
        }

        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn ExternalTaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Handler for a task type reached at runtime
    pub fn require(&self, task_type: &str, session_id: i64) -> Result<Arc<dyn ExternalTaskHandler>> {
        self.get(task_type)
            .ok_or_else(|| SessionError::MissingHandler {
                task_type: task_type.to_string(),
                session_id,
            })
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types in sorted order
    pub fn registered_task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every handler
    pub fn clear(&mut self) {
        debug!(handlers = self.handlers.len(), "Releasing work item handlers");
        self.handlers.clear();
    }
}

impl std::fmt::Debug for WorkItemHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItemHandlerRegistry")
            .field("known_task_types", &self.known_task_types)
            .field("registered", &self.registered_task_types())
            .finish()
    }
}
