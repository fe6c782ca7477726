//! Session Lifecycle Tests
//!
//! Compilation, handler registration, disposal and the failure paths of the
//! auto-transactional session operations.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::common::*;
use process_sessions::config::ConfigManager;
use process_sessions::constants::{sequences as sequence_names, HUMAN_TASK};
use process_sessions::database::sequences;
use process_sessions::definitions::{
    DefinitionResource, KnowledgeBaseTable, ResourceType, VariableValue, Variables,
};
use process_sessions::session::{Environment, SessionStore};
use process_sessions::work_items::IndexingTaskHandler;
use process_sessions::{Result, SessionError};

const UNDEFINED_PROCESS_RULES: &str = r#"
package: com.salaboy.rules
rules:
  - name: Start something that does not exist
    when:
      fact_type: Person
    then:
      start_process: com.salaboy.process.Missing
      bind_as: person
"#;

#[tokio::test]
async fn test_compile_collects_diagnostics_from_every_resource() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let resources = vec![
        process_one(),
        DefinitionResource::new("broken.yaml", ResourceType::Process, "id: [unclosed"),
        DefinitionResource::new("rules.yaml", ResourceType::Rules, UNDEFINED_PROCESS_RULES),
        DefinitionResource::from_path(resource_path("missing.yaml"), ResourceType::Process),
    ];

    let err = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, resources)
        .await
        .unwrap_err();

    let diagnostics = err.diagnostics();
    assert!(matches!(err, SessionError::DefinitionCompile { .. }));
    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.iter().any(|d| d.resource == "broken.yaml"));
    assert!(diagnostics
        .iter()
        .any(|d| d.resource == "rules.yaml" && d.message.contains("com.salaboy.process.Missing")));
    assert!(diagnostics.iter().any(|d| d.resource.ends_with("missing.yaml")));

    // Nothing was registered and no session row was written
    assert!(kbases.is_empty());
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_info")
        .fetch_one(db.env.pool())
        .await?;
    assert_eq!(rows, 0);
    Ok(())
}

#[tokio::test]
async fn test_handler_registration_is_validated() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    let handler = Arc::new(IndexingTaskHandler::default());

    let blank = session.register_handler("  ", handler.clone()).unwrap_err();
    assert!(matches!(blank, SessionError::HandlerRegistration { .. }));

    let unknown = session
        .register_handler("Robot Task", handler.clone())
        .unwrap_err();
    assert!(matches!(unknown, SessionError::HandlerRegistration { ref task_type, .. } if task_type == "Robot Task"));

    session.register_handler(HUMAN_TASK, handler.clone())?;
    let duplicate = session.register_handler(HUMAN_TASK, handler.clone()).unwrap_err();
    assert!(matches!(duplicate, SessionError::HandlerRegistration { .. }));

    // Failed batch registers nothing
    let err = session
        .register_handler_for(TASK_TYPES, handler)
        .unwrap_err();
    assert!(matches!(err, SessionError::HandlerRegistration { .. }));
    assert_eq!(session.handlers()?.registered_task_types(), vec![HUMAN_TASK.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_disposed_session_rejects_every_operation() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, Some("salaboy"));
    lifecycle.dispose(&mut session)?;
    assert!(session.is_disposed());

    let invalid = |result: Result<()>| matches!(result, Err(SessionError::InvalidState(_)));

    assert!(invalid(
        session
            .start_process(PROCESS_ID, person_params("Salaboy", 29))
            .await
            .map(drop)
    ));
    assert!(invalid(session.insert(person("Salaboy", 29)).await.map(drop)));
    assert!(invalid(session.fire_all_rules().await.map(drop)));
    assert!(invalid(session.abort_process_instance(1).await));
    assert!(invalid(session.work_item_manager().map(drop)));
    assert!(invalid(
        session.register_handler(HUMAN_TASK, Arc::new(IndexingTaskHandler::default()))
    ));
    assert!(invalid(session.state().map(drop)));
    assert!(invalid(session.pending_work_items().map(drop)));
    assert!(invalid(session.knowledge_base().map(drop)));
    assert!(invalid(session.handlers().map(drop)));
    assert!(invalid(lifecycle.dispose(&mut session)));

    let mut scope = db.env.transactions().begin().await?;
    assert!(invalid(session.insert_in(&mut scope, person("Salaboy", 29)).await.map(drop)));
    scope.rollback().await?;

    // The stored session is untouched and loads again
    let reloaded = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, session.id())
        .await?;
    assert_eq!(reloaded.version(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_handler_rolls_back_start() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;

    let err = session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::MissingHandler { ref task_type, session_id } if task_type == HUMAN_TASK && session_id == session.id()
    ));

    assert!(session.process_instances()?.is_empty());
    assert_eq!(session.version(), 0);
    let instances = sequences::current_value(db.env.pool(), sequence_names::PROCESS_INSTANCE).await?;
    assert_eq!(instances, 0);

    // Registering the handler afterwards makes the same call succeed
    register_indexing(&mut session, None);
    let instance_id = session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    assert_eq!(instance_id, 1);
    Ok(())
}

#[tokio::test]
async fn test_start_variables_are_validated() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    register_indexing(&mut session, None);

    let missing = session
        .start_process(PROCESS_ID, Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(missing, SessionError::Validation(_)));

    let mut wrong_kind = Variables::new();
    wrong_kind.insert("person".to_string(), VariableValue::from("Salaboy"));
    let err = session.start_process(PROCESS_ID, wrong_kind).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let mut undeclared = person_params("Salaboy", 29);
    undeclared.insert("shoe_size".to_string(), VariableValue::Integer(44));
    let err = session.start_process(PROCESS_ID, undeclared).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let unknown = session
        .start_process("com.salaboy.process.Missing", person_params("Salaboy", 29))
        .await
        .unwrap_err();
    assert!(unknown.is_not_found());

    assert_eq!(session.version(), 0);
    assert!(db.index().find_all_active().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_non_finite_numbers_never_reach_the_store() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    register_indexing(&mut session, None);

    let mut params = Variables::new();
    params.insert(
        "person".to_string(),
        VariableValue::Record(person("Salaboy", 29).with("score", f64::NAN)),
    );
    let err = session.start_process(PROCESS_ID, params).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let err = session
        .insert(person("Salaboy", 29).with("score", f64::INFINITY))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    assert_eq!(session.version(), 0);
    assert!(session.facts()?.is_empty());
    assert!(session.process_instances()?.is_empty());

    // Stored state is still readable
    session.insert(person("Salaboy", 29).with("score", 0.5)).await?;
    let reloaded = db
        .lifecycle()
        .load_session_by_key(&kbases, PATTERN_KEY, session.id())
        .await?;
    assert_eq!(reloaded.version(), 1);
    assert_eq!(reloaded.facts()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rules_start_processes_once_per_fact() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, None);

    session.insert(person("Adult", 40)).await?;
    session.insert(person("Minor", 12)).await?;
    assert_eq!(session.fire_all_rules().await?, 1);
    assert_eq!(session.fire_all_rules().await?, 0);

    session.insert(person("Another Adult", 18)).await?;
    assert_eq!(session.fire_all_rules().await?, 1);

    assert_eq!(session.process_instances()?.len(), 2);
    assert_eq!(session.facts()?.len(), 3);
    assert_eq!(db.index().find_all_active().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_operations_in_caller_scope_commit_together() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, Some("batch"));

    let mut scope = db.env.transactions().begin().await?;
    session.insert_in(&mut scope, person("Salaboy", 29)).await?;
    session.fire_all_rules_in(&mut scope).await?;
    session
        .start_process_in(&mut scope, PROCESS_ID, person_params("Salaboy2", 31))
        .await?;

    assert_eq!(session.version(), 3);
    scope.commit().await?;

    let stored = db.env.store().find(session.id()).await?.expect("row");
    assert_eq!(stored.version, 3);
    assert_eq!(db.index().find_by_session(session.id()).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_operation_in_caller_scope_leaves_no_writes() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    let failing = Arc::new(FailingHandler::default());
    session.register_handler(HUMAN_TASK, failing.clone())?;

    let mut scope = db.env.transactions().begin().await?;
    let err = session
        .start_process_in(&mut scope, PROCESS_ID, person_params("Salaboy", 29))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Handler(_)));
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

    // The caller keeps using its scope and commits
    session.insert_in(&mut scope, person("Salaboy", 29)).await?;
    scope.commit().await?;

    let pool = db.env.pool();
    assert!(db.index().find_all_active().await?.is_empty());
    assert_eq!(sequences::current_value(pool, sequence_names::PROCESS_INSTANCE).await?, 0);
    assert_eq!(sequences::current_value(pool, sequence_names::WORK_ITEM).await?, 0);

    let stored = db.env.store().find(session.id()).await?.expect("row");
    assert_eq!(stored.version, 1);
    let reloaded = db
        .lifecycle()
        .load_session_by_key(&kbases, PATTERN_KEY, session.id())
        .await?;
    assert!(reloaded.process_instances()?.is_empty());
    assert!(reloaded.pending_work_items()?.is_empty());
    assert_eq!(reloaded.facts()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_environment_builder_and_configuration() -> Result<()> {
    let dir = tempfile::TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("process-sessions.yaml"),
        r#"
database:
  url: "sqlite://unused.db"
test:
  database:
    url: "sqlite::memory:"
    max_connections: 4
sessions:
  default_business_key: "walkthrough"
"#,
    )
    .expect("write config");

    let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")?;
    let config = manager.config();
    assert!(config.database.is_in_memory());
    assert_eq!(config.sessions.default_business_key.as_deref(), Some("walkthrough"));

    let env = Environment::connect(&config.database).await?;
    let rebuilt = Environment::builder()
        .store(SessionStore::new(env.pool().clone()))
        .transaction_manager(env.transactions().clone())
        .build()?;

    let lifecycle = process_sessions::SessionLifecycleManager::new(rebuilt);
    let kbase = lifecycle.compile(vec![process_one()])?;
    let mut session = lifecycle.new_session(kbase.clone()).await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let mut reloaded = lifecycle.load_session(session_id, kbase).await?;
    assert_eq!(reloaded.id(), session_id);

    // Handlers built from configuration index under the default key
    let task_types = config.sessions.handler_task_types.clone();
    reloaded.register_handler_for(
        task_types,
        Arc::new(IndexingTaskHandler::from_config(&config.sessions, None)),
    )?;
    reloaded
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    let entity = env.index().find_active_by_key("walkthrough").await?;
    assert_eq!(entity.session_id, session_id);

    let err = Environment::builder().build().unwrap_err();
    assert!(matches!(err, SessionError::Configuration(_)));
    Ok(())
}
