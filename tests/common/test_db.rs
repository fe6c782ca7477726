use process_sessions::config::DatabaseConfig;
use process_sessions::models::BusinessEntityIndex;
use process_sessions::orchestration::{CompletionCoordinator, SessionLifecycleManager};
use process_sessions::session::Environment;
use tempfile::TempDir;

/// Fresh SQLite file per test, removed with the temp directory
pub struct TestDatabase {
    pub env: Environment,
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("sessions.db").display());
        let env = Environment::connect(&DatabaseConfig::with_url(url))
            .await
            .expect("test database");
        Self { env, _dir: dir }
    }

    pub fn lifecycle(&self) -> SessionLifecycleManager {
        SessionLifecycleManager::new(self.env.clone())
    }

    pub fn coordinator(&self) -> CompletionCoordinator {
        CompletionCoordinator::new(self.env.clone())
    }

    pub fn index(&self) -> BusinessEntityIndex {
        self.env.index()
    }
}
