//! Handler registration and work item completion for one session.

use std::sync::Arc;

use super::handler::ExternalTaskHandler;
use super::work_item::{WorkItem, WorkItemCompletion};
use crate::database::TransactionScope;
use crate::definitions::Variables;
use crate::error::Result;
use crate::session::StatefulSession;

/// Borrowed view of a session's work items.
///
/// Completing a work item resumes the owning process instance, which runs to
/// its next suspension point before the call returns.
pub struct WorkItemManager<'s> {
    session: &'s mut StatefulSession,
}

impl<'s> WorkItemManager<'s> {
    pub(crate) fn new(session: &'s mut StatefulSession) -> Self {
        Self { session }
    }

    pub fn session_id(&self) -> i64 {
        self.session.id()
    }

    pub fn register_handler(
        &mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn ExternalTaskHandler>,
    ) -> Result<()> {
        self.session.register_handler(task_type, handler)
    }

    /// Register one handler under several task types at once
    pub fn register_handler_for<I, S>(&mut self, task_types: I, handler: Arc<dyn ExternalTaskHandler>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session.register_handler_for(task_types, handler)
    }

    /// Complete a pending work item in a transaction of its own
    pub async fn complete_work_item(
        &mut self,
        work_item_id: i64,
        results: Option<Variables>,
    ) -> Result<WorkItemCompletion> {
        self.session.complete_work_item(work_item_id, results).await
    }

    /// Complete a pending work item inside the caller's transaction
    pub async fn complete_work_item_in(
        &mut self,
        scope: &mut TransactionScope,
        work_item_id: i64,
        results: Option<Variables>,
    ) -> Result<WorkItemCompletion> {
        self.session
            .complete_work_item_in(scope, work_item_id, results)
            .await
    }

    pub fn get(&self, work_item_id: i64) -> Result<Option<&WorkItem>> {
        self.session.work_item(work_item_id)
    }

    pub fn pending(&self) -> Result<Vec<&WorkItem>> {
        self.session.pending_work_items()
    }
}
