//! # Session Lifecycle Manager
//!
//! Entry point for compiling definitions and creating, reloading and
//! disposing sessions against one [`Environment`].
//!
//! ```rust,no_run
//! use process_sessions::config::DatabaseConfig;
//! use process_sessions::definitions::{DefinitionResource, KnowledgeBaseTable, ResourceType};
//! use process_sessions::orchestration::SessionLifecycleManager;
//! use process_sessions::session::Environment;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = Environment::connect(&DatabaseConfig::with_url("sqlite://data/sessions.db")).await?;
//! let manager = SessionLifecycleManager::new(env);
//!
//! let mut kbases = KnowledgeBaseTable::new();
//! let resources = vec![DefinitionResource::from_path(
//!     "resources/process-async-interactions.yaml",
//!     ResourceType::Process,
//! )];
//! let mut session = manager.create_session(&mut kbases, "myProcessDefinitionSession", resources).await?;
//! let session_id = session.id();
//! manager.dispose(&mut session)?;
//!
//! let kbase = kbases.require("myProcessDefinitionSession")?;
//! let session = manager.load_session(session_id, kbase).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::{info, instrument};

use crate::definitions::{DefinitionResource, KnowledgeBase, KnowledgeBaseTable, KnowledgeBuilder};
use crate::error::Result;
use crate::session::{Environment, StatefulSession};

#[derive(Debug, Clone)]
pub struct SessionLifecycleManager {
    env: Environment,
}

impl SessionLifecycleManager {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Compile definition resources into a shared knowledge base. Fails with
    /// every diagnostic found if any resource is invalid.
    pub fn compile(
        &self,
        resources: impl IntoIterator<Item = DefinitionResource>,
    ) -> Result<Arc<KnowledgeBase>> {
        KnowledgeBuilder::new().add_all(resources).build()
    }

    /// Compile `resources`, register the result in `table` under `key` and
    /// start a fresh persisted session on it
    #[instrument(skip(self, table, resources))]
    pub async fn create_session(
        &self,
        table: &mut KnowledgeBaseTable,
        key: &str,
        resources: impl IntoIterator<Item = DefinitionResource>,
    ) -> Result<StatefulSession> {
        let kbase = self.compile(resources)?;
        if let Some(previous) = table.register(key, kbase.clone()) {
            info!(
                key = %key,
                previous = %previous.fingerprint(),
                current = %kbase.fingerprint(),
                "Replaced knowledge base"
            );
        }
        self.new_session(kbase).await
    }

    pub async fn new_session(&self, kbase: Arc<KnowledgeBase>) -> Result<StatefulSession> {
        StatefulSession::create(&self.env, kbase).await
    }

    /// Reload a stored session. Handlers are not persisted and must be
    /// registered again before the session reaches another task.
    #[instrument(skip(self, kbase))]
    pub async fn load_session(
        &self,
        session_id: i64,
        kbase: Arc<KnowledgeBase>,
    ) -> Result<StatefulSession> {
        StatefulSession::load(&self.env, session_id, kbase).await
    }

    /// Reload a stored session with the knowledge base registered under `key`
    pub async fn load_session_by_key(
        &self,
        table: &KnowledgeBaseTable,
        key: &str,
        session_id: i64,
    ) -> Result<StatefulSession> {
        let kbase = table.require(key)?;
        self.load_session(session_id, kbase).await
    }

    /// Release a session. Its stored state stays loadable.
    pub fn dispose(&self, session: &mut StatefulSession) -> Result<()> {
        session.dispose()
    }
}
