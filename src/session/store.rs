//! # Durable Session Store
//!
//! One `session_info` row per session: the knowledge base fingerprint it was
//! created from, the JSON session state and an optimistic version counter.
//! Saves run on the caller's transaction connection so session state commits
//! together with whatever else the operation wrote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::state::SessionState;
use crate::constants::events;
use crate::definitions::{KnowledgeBase, Node};
use crate::error::{Result, SessionError};
use crate::logging::log_session_operation;

/// Session row metadata.
/// Maps to `session_info` table (state data excluded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionInfo {
    pub session_id: i64,
    pub knowledge_fingerprint: String,
    pub version: i64,
    pub started_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    #[sqlx(flatten)]
    info: SessionInfo,
    state_data: String,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new session row and assign its id
    pub async fn create(&self, kbase: &KnowledgeBase, state: &SessionState) -> Result<SessionInfo> {
        let now = Utc::now();
        let info = sqlx::query_as::<_, SessionInfo>(
            r#"
            INSERT INTO session_info (knowledge_fingerprint, state_data, version, started_at, last_modified)
            VALUES (?1, ?2, 0, ?3, ?3)
            RETURNING session_id, knowledge_fingerprint, version, started_at, last_modified
            "#,
        )
        .bind(kbase.fingerprint())
        .bind(state.to_json()?)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        log_session_operation(
            events::SESSION_CREATED,
            Some(info.session_id),
            Some(info.version),
            "persisted",
            None,
        );

        Ok(info)
    }

    /// Write new state if the stored version still equals `expected_version`.
    /// Returns the new version.
    pub async fn save(
        conn: &mut SqliteConnection,
        session_id: i64,
        expected_version: i64,
        state: &SessionState,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            UPDATE session_info
            SET state_data = ?1, version = version + 1, last_modified = ?2
            WHERE session_id = ?3 AND version = ?4
            "#,
        )
        .bind(state.to_json()?)
        .bind(Utc::now())
        .bind(session_id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM session_info WHERE session_id = ?1")
                    .bind(session_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            return Err(match exists {
                None => SessionError::not_found(format!("session {session_id}")),
                Some(_) => SessionError::ConcurrentModification {
                    session_id,
                    expected_version,
                },
            });
        }

        debug!(
            session_id = session_id,
            version = expected_version + 1,
            "{}", events::SESSION_SAVED
        );
        Ok(expected_version + 1)
    }

    /// Metadata of a session row, if it exists
    pub async fn find(&self, session_id: i64) -> Result<Option<SessionInfo>> {
        let info = sqlx::query_as::<_, SessionInfo>(
            r#"
            SELECT session_id, knowledge_fingerprint, version, started_at, last_modified
            FROM session_info
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(info)
    }

    /// Load a session's state and check it against the knowledge base it is
    /// being paired with
    pub async fn load(
        &self,
        session_id: i64,
        kbase: &KnowledgeBase,
    ) -> Result<(SessionInfo, SessionState)> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, knowledge_fingerprint, version, started_at, last_modified, state_data
            FROM session_info
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SessionError::not_found(format!("session {session_id}")))?;

        if row.info.knowledge_fingerprint != kbase.fingerprint() {
            return Err(SessionError::StateMismatch {
                session_id,
                reason: format!(
                    "session was created from knowledge base {} but {} was supplied",
                    row.info.knowledge_fingerprint,
                    kbase.fingerprint()
                ),
            });
        }

        let state = SessionState::from_json(&row.state_data).map_err(|e| {
            SessionError::StateMismatch {
                session_id,
                reason: format!("stored state cannot be decoded: {e}"),
            }
        })?;

        Self::reconcile(session_id, &state, kbase)?;

        log_session_operation(
            events::SESSION_LOADED,
            Some(session_id),
            Some(row.info.version),
            "loaded",
            None,
        );

        Ok((row.info, state))
    }

    /// Every instance and pending work item must point at a node the
    /// knowledge base still defines
    fn reconcile(session_id: i64, state: &SessionState, kbase: &KnowledgeBase) -> Result<()> {
        let mismatch = |reason: String| SessionError::StateMismatch { session_id, reason };

        for process_id in state.referenced_processes() {
            if kbase.process(process_id).is_none() {
                return Err(mismatch(format!(
                    "state references unknown process '{process_id}'"
                )));
            }
        }

        for instance in state.process_instances.values() {
            let process = kbase.require_process(&instance.process_id)?;
            if process.node(&instance.current_node).is_none() {
                return Err(mismatch(format!(
                    "process instance {} is at unknown node '{}'",
                    instance.id, instance.current_node
                )));
            }
        }

        for item in state.pending_work_items() {
            let process = kbase.require_process(&item.process_id)?;
            if !matches!(process.node(&item.node_id), Some(Node::Task(_))) {
                return Err(mismatch(format!(
                    "work item {} is at '{}', which is not a task node",
                    item.id, item.node_id
                )));
            }
        }

        Ok(())
    }
}
