//! # Stateful Session
//!
//! A durable execution context: process instances, pending work items and
//! facts that survive restarts through the session store.
//!
//! Every state-changing operation comes in two forms. The plain form opens
//! its own transaction, persists the new state and commits. The `_in` form
//! joins a caller-owned [`TransactionScope`] and leaves commit or rollback to
//! the caller. In both forms a failed operation leaves the in-memory state
//! exactly as it was before the call, and the `_in` form also undoes its own
//! database writes so the caller's scope holds only its other work.

use std::sync::Arc;
use tracing::{debug, warn};

use super::environment::Environment;
use super::runtime::Runtime;
use super::state::{FactHandle, ProcessInstance, SessionState};
use super::store::{SessionInfo, SessionStore};
use crate::constants::events;
use crate::database::{Savepoint, TransactionManager, TransactionScope};
use crate::definitions::{KnowledgeBase, Record, Variables};
use crate::error::{Result, SessionError};
use crate::logging::log_session_operation;
use crate::work_items::{
    ExternalTaskHandler, WorkItem, WorkItemCompletion, WorkItemHandlerRegistry, WorkItemManager,
};

/// In-memory state to return to when an operation fails
struct Checkpoint {
    state: SessionState,
    version: i64,
}

pub struct StatefulSession {
    id: i64,
    version: i64,
    kbase: Option<Arc<KnowledgeBase>>,
    state: SessionState,
    handlers: WorkItemHandlerRegistry,
    transactions: TransactionManager,
    disposed: bool,
}

impl StatefulSession {
    /// Persist a brand new, empty session
    pub(crate) async fn create(env: &Environment, kbase: Arc<KnowledgeBase>) -> Result<Self> {
        let state = SessionState::default();
        let info = env.store().create(&kbase, &state).await?;
        Ok(Self::from_parts(info, state, kbase, env.transactions().clone()))
    }

    /// Resume a stored session with the knowledge base it was created from
    pub(crate) async fn load(
        env: &Environment,
        session_id: i64,
        kbase: Arc<KnowledgeBase>,
    ) -> Result<Self> {
        let (info, state) = env.store().load(session_id, &kbase).await?;
        Ok(Self::from_parts(info, state, kbase, env.transactions().clone()))
    }

    fn from_parts(
        info: SessionInfo,
        state: SessionState,
        kbase: Arc<KnowledgeBase>,
        transactions: TransactionManager,
    ) -> Self {
        Self {
            id: info.session_id,
            version: info.version,
            handlers: WorkItemHandlerRegistry::new(kbase.task_types()),
            kbase: Some(kbase),
            state,
            transactions,
            disposed: false,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Version of the stored state this session last read or wrote
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn knowledge_base(&self) -> Result<&Arc<KnowledgeBase>> {
        self.ensure_active()?;
        self.kbase.as_ref().ok_or_else(|| self.disposed_error())
    }

    pub fn state(&self) -> Result<&SessionState> {
        self.ensure_active()?;
        Ok(&self.state)
    }

    /// Access to handler registration and work item completion
    pub fn work_item_manager(&mut self) -> Result<WorkItemManager<'_>> {
        self.ensure_active()?;
        Ok(WorkItemManager::new(self))
    }

    pub fn register_handler(
        &mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn ExternalTaskHandler>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.handlers.register(task_type, handler)
    }

    pub fn register_handler_for<I, S>(&mut self, task_types: I, handler: Arc<dyn ExternalTaskHandler>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_active()?;
        self.handlers.register_all(task_types, handler)
    }

    pub fn handlers(&self) -> Result<&WorkItemHandlerRegistry> {
        self.ensure_active()?;
        Ok(&self.handlers)
    }

    pub fn process_instance(&self, instance_id: i64) -> Result<Option<&ProcessInstance>> {
        self.ensure_active()?;
        Ok(self.state.process_instances.get(&instance_id))
    }

    pub fn process_instances(&self) -> Result<Vec<&ProcessInstance>> {
        self.ensure_active()?;
        Ok(self.state.process_instances.values().collect())
    }

    pub fn work_item(&self, work_item_id: i64) -> Result<Option<&WorkItem>> {
        self.ensure_active()?;
        Ok(self.state.work_items.get(&work_item_id))
    }

    pub fn pending_work_items(&self) -> Result<Vec<&WorkItem>> {
        self.ensure_active()?;
        Ok(self.state.pending_work_items().collect())
    }

    pub fn facts(&self) -> Result<Vec<(FactHandle, &Record)>> {
        self.ensure_active()?;
        Ok(self.state.facts.iter().map(|(handle, fact)| (*handle, fact)).collect())
    }

    /// Start an instance of a process definition and run it to its first
    /// suspension point. Returns the new instance id.
    pub async fn start_process(&mut self, process_id: &str, variables: Variables) -> Result<i64> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let mut scope = self.transactions.begin().await?;
        let result = self.start_process_in(&mut scope, process_id, variables).await;
        self.finish_scope(scope, checkpoint, result).await
    }

    pub async fn start_process_in(
        &mut self,
        scope: &mut TransactionScope,
        process_id: &str,
        variables: Variables,
    ) -> Result<i64> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let savepoint = scope.savepoint().await?;
        let result: Result<i64> = async {
            let instance_id = self.runtime(scope)?.start_process(process_id, variables).await?;
            self.persist(scope).await?;
            Ok(instance_id)
        }
        .await;
        self.settle(scope, savepoint, checkpoint, result).await
    }

    /// Add a fact to working memory. Rules see it on the next
    /// [`fire_all_rules`](Self::fire_all_rules).
    pub async fn insert(&mut self, fact: Record) -> Result<FactHandle> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let mut scope = self.transactions.begin().await?;
        let result = self.insert_in(&mut scope, fact).await;
        self.finish_scope(scope, checkpoint, result).await
    }

    pub async fn insert_in(&mut self, scope: &mut TransactionScope, fact: Record) -> Result<FactHandle> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let savepoint = scope.savepoint().await?;
        let result: Result<FactHandle> = async {
            let handle = self.runtime(scope)?.insert(fact)?;
            self.persist(scope).await?;
            Ok(handle)
        }
        .await;
        self.settle(scope, savepoint, checkpoint, result).await
    }

    /// Evaluate rules against working memory and start a process for every
    /// new match. Returns how many activations fired.
    pub async fn fire_all_rules(&mut self) -> Result<usize> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let mut scope = self.transactions.begin().await?;
        let result = self.fire_all_rules_in(&mut scope).await;
        self.finish_scope(scope, checkpoint, result).await
    }

    pub async fn fire_all_rules_in(&mut self, scope: &mut TransactionScope) -> Result<usize> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let savepoint = scope.savepoint().await?;
        let result: Result<usize> = async {
            let fired = self.runtime(scope)?.fire_all_rules().await?;
            self.persist(scope).await?;
            Ok(fired)
        }
        .await;
        self.settle(scope, savepoint, checkpoint, result).await
    }

    pub async fn abort_process_instance(&mut self, instance_id: i64) -> Result<()> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let mut scope = self.transactions.begin().await?;
        let result = self.abort_process_instance_in(&mut scope, instance_id).await;
        self.finish_scope(scope, checkpoint, result).await
    }

    pub async fn abort_process_instance_in(
        &mut self,
        scope: &mut TransactionScope,
        instance_id: i64,
    ) -> Result<()> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let savepoint = scope.savepoint().await?;
        let result: Result<()> = async {
            self.runtime(scope)?.abort_process_instance(instance_id).await?;
            self.persist(scope).await
        }
        .await;
        self.settle(scope, savepoint, checkpoint, result).await
    }

    pub(crate) async fn complete_work_item(
        &mut self,
        work_item_id: i64,
        results: Option<Variables>,
    ) -> Result<WorkItemCompletion> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let mut scope = self.transactions.begin().await?;
        let result = self.complete_work_item_in(&mut scope, work_item_id, results).await;
        self.finish_scope(scope, checkpoint, result).await
    }

    pub(crate) async fn complete_work_item_in(
        &mut self,
        scope: &mut TransactionScope,
        work_item_id: i64,
        results: Option<Variables>,
    ) -> Result<WorkItemCompletion> {
        self.ensure_active()?;
        let checkpoint = self.checkpoint();
        let savepoint = scope.savepoint().await?;
        let result: Result<WorkItemCompletion> = async {
            let completion = self
                .runtime(scope)?
                .complete_work_item(work_item_id, results)
                .await?;
            self.persist(scope).await?;
            Ok(completion)
        }
        .await;
        self.settle(scope, savepoint, checkpoint, result).await
    }

    /// Release the session's resources. Stored state is untouched and the
    /// session can be loaded again; this handle is unusable afterwards.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.handlers.clear();
        self.kbase = None;
        self.state = SessionState::default();

        log_session_operation(
            events::SESSION_DISPOSED,
            Some(self.id),
            Some(self.version),
            "disposed",
            None,
        );
    }

    /// Put back the in-memory state captured before a failed operation
    pub(crate) fn restore_to(&mut self, state: SessionState, version: i64) {
        self.state = state;
        self.version = version;
    }

    pub(crate) fn snapshot(&self) -> (SessionState, i64) {
        (self.state.clone(), self.version)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.disposed {
            return Err(self.disposed_error());
        }
        Ok(())
    }

    fn disposed_error(&self) -> SessionError {
        SessionError::invalid_state(format!("session {} has been disposed", self.id))
    }

    fn runtime<'a>(&'a mut self, scope: &'a mut TransactionScope) -> Result<Runtime<'a>> {
        let session_id = self.id;
        let kbase = self.kbase.as_deref().ok_or_else(|| {
            SessionError::invalid_state(format!("session {session_id} has been disposed"))
        })?;

        Ok(Runtime {
            session_id: self.id,
            kbase,
            handlers: &self.handlers,
            state: &mut self.state,
            scope,
            created_work_items: Vec::new(),
        })
    }

    async fn persist(&mut self, scope: &mut TransactionScope) -> Result<()> {
        self.version =
            SessionStore::save(scope.connection(), self.id, self.version, &self.state).await?;
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            version: self.version,
        }
    }

    /// Close out an operation running in a caller's scope. A failure undoes
    /// the operation's writes back to `savepoint` and restores memory, so the
    /// caller may still commit the rest of its work.
    async fn settle<T>(
        &mut self,
        scope: &mut TransactionScope,
        savepoint: Savepoint,
        checkpoint: Checkpoint,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => match scope.release(savepoint).await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.restore_to(checkpoint.state, checkpoint.version);
                    Err(e)
                }
            },
            Err(e) => {
                if let Err(rollback_error) = scope.rollback_to(savepoint).await {
                    warn!(
                        session_id = self.id,
                        transaction_id = %scope.id(),
                        error = %rollback_error,
                        "Rollback to savepoint failed"
                    );
                }
                self.restore_to(checkpoint.state, checkpoint.version);
                Err(e)
            }
        }
    }

    /// Commit or roll back a scope this session opened itself
    async fn finish_scope<T>(
        &mut self,
        scope: TransactionScope,
        checkpoint: Checkpoint,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => match scope.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.restore_to(checkpoint.state, checkpoint.version);
                    Err(e)
                }
            },
            Err(e) => {
                let transaction_id = scope.id();
                if let Err(rollback_error) = scope.rollback().await {
                    warn!(
                        session_id = self.id,
                        transaction_id = %transaction_id,
                        error = %rollback_error,
                        "Rollback failed"
                    );
                }
                debug!(session_id = self.id, error = %e, "Operation rolled back");
                Err(e)
            }
        }
    }
}

impl Drop for StatefulSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StatefulSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulSession")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("process_instances", &self.state.process_instances.len())
            .field("pending_work_items", &self.state.pending_work_items().count())
            .field("handlers", &self.handlers)
            .field("disposed", &self.disposed)
            .finish()
    }
}
