//! # Transactional Completion Coordinator
//!
//! Completes the work item behind a business entity and deactivates that
//! entity in a single transaction.
//!
//! ## Stages
//!
//! `Begin -> CompleteWorkItem -> DeactivateEntity -> Commit`
//!
//! A failure at any stage rolls the transaction back, restores the session's
//! in-memory state and surfaces as [`SessionError::TransactionFailure`]
//! naming the stage. The session is disposed whatever the outcome; reload it
//! to continue. There are no automatic retries.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::constants::events;
use crate::database::TransactionScope;
use crate::definitions::Variables;
use crate::error::{CompletionStage, Result, SessionError};
use crate::logging::log_error;
use crate::models::{BusinessEntity, BusinessEntityIndex};
use crate::session::{Environment, SessionState, StatefulSession};

/// Result of a committed completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub transaction_id: Uuid,
    pub session_id: i64,
    pub work_item_id: i64,
    pub entity_id: i64,
    /// Work items the resumed process instance reached before suspending again
    pub created_work_items: Vec<i64>,
    pub process_completed: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionCoordinator {
    env: Environment,
}

impl CompletionCoordinator {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Complete `entity`'s work item in `session` and deactivate `entity`,
    /// atomically. Consumes and disposes the session.
    #[instrument(
        skip_all,
        fields(session_id = session.id(), entity_id = entity.id, work_item_id = entity.work_item_id)
    )]
    pub async fn complete(
        &self,
        mut session: StatefulSession,
        entity: &BusinessEntity,
        results: Option<Variables>,
    ) -> Result<CompletionOutcome> {
        let outcome = self.run(&mut session, entity, results).await;

        if !session.is_disposed() {
            if let Err(e) = session.dispose() {
                warn!(session_id = session.id(), error = %e, "Session dispose failed");
            }
        }

        outcome
    }

    async fn run(
        &self,
        session: &mut StatefulSession,
        entity: &BusinessEntity,
        results: Option<Variables>,
    ) -> Result<CompletionOutcome> {
        Self::check_preconditions(session, entity)?;

        let (state, version) = session.snapshot();

        let mut scope = self.env.transactions().begin().await.map_err(|source| {
            // No transaction exists yet to carry an id
            SessionError::TransactionFailure {
                transaction_id: Uuid::nil(),
                stage: CompletionStage::Begin,
                source: Box::new(source),
            }
        })?;
        let transaction_id = scope.id();

        let completion = match session
            .complete_work_item_in(&mut scope, entity.work_item_id, results)
            .await
        {
            Ok(completion) => completion,
            Err(source) => {
                return Err(Self::abort(
                    scope,
                    session,
                    (state, version),
                    CompletionStage::CompleteWorkItem,
                    source,
                )
                .await)
            }
        };

        if let Err(source) = BusinessEntityIndex::deactivate(&mut scope, entity.id).await {
            return Err(Self::abort(
                scope,
                session,
                (state, version),
                CompletionStage::DeactivateEntity,
                source,
            )
            .await);
        }

        if let Err(source) = scope.commit().await {
            session.restore_to(state, version);
            log_error(
                "completion_coordinator",
                events::COMPLETION_ROLLED_BACK,
                &source.to_string(),
                Some(&format!("stage={}", CompletionStage::Commit)),
            );
            return Err(SessionError::TransactionFailure {
                transaction_id,
                stage: CompletionStage::Commit,
                source: Box::new(source),
            });
        }

        info!(
            transaction_id = %transaction_id,
            session_id = session.id(),
            work_item_id = entity.work_item_id,
            entity_id = entity.id,
            created_work_items = ?completion.created_work_items,
            process_completed = completion.process_completed,
            "{}", events::COMPLETION_COMMITTED
        );
        info!(entity_id = entity.id, "{}", events::ENTITY_DEACTIVATED);

        Ok(CompletionOutcome {
            transaction_id,
            session_id: session.id(),
            work_item_id: entity.work_item_id,
            entity_id: entity.id,
            created_work_items: completion.created_work_items,
            process_completed: completion.process_completed,
        })
    }

    fn check_preconditions(session: &StatefulSession, entity: &BusinessEntity) -> Result<()> {
        if session.is_disposed() {
            return Err(SessionError::invalid_state(format!(
                "session {} has been disposed",
                session.id()
            )));
        }
        if !entity.active {
            return Err(SessionError::invalid_state(format!(
                "business entity {} is no longer active",
                entity.id
            )));
        }
        if entity.session_id != session.id() {
            return Err(SessionError::invalid_state(format!(
                "business entity {} belongs to session {}, not session {}",
                entity.id,
                entity.session_id,
                session.id()
            )));
        }
        Ok(())
    }

    /// Roll back, put the session back where it was and wrap the cause
    async fn abort(
        scope: TransactionScope,
        session: &mut StatefulSession,
        (state, version): (SessionState, i64),
        stage: CompletionStage,
        source: SessionError,
    ) -> SessionError {
        let transaction_id = scope.id();

        if let Err(rollback_error) = scope.rollback().await {
            log_error(
                "completion_coordinator",
                events::COMPLETION_ROLLED_BACK,
                &rollback_error.to_string(),
                Some(&format!("stage={}", CompletionStage::Rollback)),
            );
        }
        session.restore_to(state, version);

        warn!(
            transaction_id = %transaction_id,
            session_id = session.id(),
            stage = %stage,
            error = %source,
            "{}", events::COMPLETION_ROLLED_BACK
        );

        SessionError::TransactionFailure {
            transaction_id,
            stage,
            source: Box::new(source),
        }
    }
}
