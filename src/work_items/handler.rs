//! # External Task Handler Contract
//!
//! Handlers are told when a process reaches an external task and when such a
//! task is aborted. They never resume the process themselves; completion is
//! driven from outside through the session's work item manager.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::work_item::WorkItem;
use crate::error::Result;

/// What a handler sees of the operation that reached its work item
pub struct HandlerContext<'a> {
    session_id: i64,
    transaction_id: Uuid,
    connection: &'a mut SqliteConnection,
}

impl<'a> HandlerContext<'a> {
    pub fn new(session_id: i64, transaction_id: Uuid, connection: &'a mut SqliteConnection) -> Self {
        Self {
            session_id,
            transaction_id,
            connection,
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    /// Connection enlisted in the engine's transaction. Writes made through it
    /// commit or roll back together with the session state.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.connection
    }
}

/// Trait for handlers of external and human tasks
///
/// Register one instance per task type with a session's work item manager;
/// the same instance may serve several task types. Handlers are not persisted
/// and must be registered again after every reload.
#[async_trait]
pub trait ExternalTaskHandler: Send + Sync {
    /// Called when execution reaches a task of a registered type
    ///
    /// Anything the handler needs to find the suspended session again must be
    /// written through `ctx.connection()` before returning. Returning an error
    /// fails and rolls back the whole operation.
    async fn on_start(&self, work_item: &WorkItem, ctx: &mut HandlerContext<'_>) -> Result<()>;

    /// Called when the owning process instance is aborted while the work item
    /// is still pending.
    /// Default implementation does nothing.
    async fn on_abort(&self, work_item: &WorkItem, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let _ = (work_item, ctx);
        Ok(())
    }

    /// Get the handler name for identification
    ///
    /// This is used for logging and debugging purposes.
    /// Default implementation returns the type name.
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
