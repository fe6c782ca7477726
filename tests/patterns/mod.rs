//! Session Pattern Tests
//!
//! End-to-end suspend, dispose, reload and complete cycles for the three ways
//! of mapping process instances onto sessions, plus the index scenarios that
//! follow from them.

use crate::common::*;
use process_sessions::definitions::{KnowledgeBaseTable, VariableValue};
use process_sessions::{Result, SessionError};

/// One session (and one knowledge base) per process instance
#[tokio::test]
async fn test_single_session_per_process_instance() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let coordinator = db.coordinator();
    let index = db.index();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session1 = lifecycle
        .create_session(&mut kbases, "salaboy", vec![process_one()])
        .await?;
    register_indexing(&mut session1, Some("salaboy"));
    let session1_id = session1.id();
    session1
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    lifecycle.dispose(&mut session1)?;

    let mut session2 = lifecycle
        .create_session(&mut kbases, "salaboy2", vec![process_two()])
        .await?;
    register_indexing(&mut session2, Some("salaboy2"));
    let session2_id = session2.id();
    session2
        .start_process(PROCESS_ID, person_params("Salaboy2", 29))
        .await?;
    lifecycle.dispose(&mut session2)?;

    assert_ne!(session1_id, session2_id);

    let entity = index.find_active_by_key("salaboy2").await?;
    assert_eq!(entity.session_id, session2_id);
    assert_eq!(index.find_all_active().await?.len(), 2);

    // Resume instance two through its own knowledge base
    let key = entity.business_key.clone().expect("business key");
    let mut session2 = lifecycle
        .load_session_by_key(&kbases, &key, entity.session_id)
        .await?;
    register_indexing(&mut session2, Some(&key));
    coordinator.complete(session2, &entity, None).await?;

    let entity = index.find_active_by_key("salaboy").await?;
    assert_eq!(entity.session_id, session1_id);

    let key = entity.business_key.clone().expect("business key");
    let mut session1 = lifecycle
        .load_session_by_key(&kbases, &key, entity.session_id)
        .await?;
    register_indexing(&mut session1, Some(&key));
    coordinator.complete(session1, &entity, None).await?;

    // Both processes have a second task waiting
    assert_eq!(index.find_all_active().await?.len(), 2);
    assert_eq!(index.find_all_inactive().await?.len(), 2);
    Ok(())
}

/// Two instances of one definition sharing a session
#[tokio::test]
async fn test_single_session_per_process_definition() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let coordinator = db.coordinator();
    let index = db.index();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    register_indexing(&mut session, None);
    session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    lifecycle.dispose(&mut session)?;

    let active = index.find_all_active().await?;
    assert_eq!(active.len(), 1);
    let session_id = active[0].session_id;
    assert_eq!(active[0].business_key, None);

    let mut session = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, session_id)
        .await?;
    register_indexing(&mut session, None);
    session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    lifecycle.dispose(&mut session)?;

    let entity = index.find_active_by_work_item_id(1).await?;
    let mut session = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, entity.session_id)
        .await?;
    register_indexing(&mut session, None);
    let outcome = coordinator.complete(session, &entity, None).await?;

    assert_eq!(outcome.work_item_id, 1);
    assert_eq!(outcome.created_work_items, vec![3]);
    assert!(!outcome.process_completed);

    let by_process = index.find_active_by_process_id(2).await?;
    assert_eq!(by_process.len(), 1);
    assert_eq!(by_process[0].work_item_id, 2);
    Ok(())
}

/// Instances started by rules instead of explicit calls
#[tokio::test]
async fn test_single_session_per_process_definition_with_rules() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let coordinator = db.coordinator();
    let index = db.index();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, Some(PATTERN_KEY));
    session.insert(person("Salaboy", 29)).await?;
    assert_eq!(session.fire_all_rules().await?, 1);
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let entity = index.find_active_by_key(PATTERN_KEY).await?;
    assert_eq!(entity.session_id, session_id);
    assert_eq!(entity.process_id, 1);
    assert_eq!(entity.work_item_id, 1);

    // The first person is already handled; only the new one fires
    let mut session = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, session_id)
        .await?;
    register_indexing(&mut session, Some(PATTERN_KEY));
    session.insert(person("Salaboy", 29)).await?;
    assert_eq!(session.fire_all_rules().await?, 1);
    assert_eq!(session.facts()?.len(), 2);
    lifecycle.dispose(&mut session)?;

    // Two suspended instances now share the key
    let err = index.find_active_by_key(PATTERN_KEY).await.unwrap_err();
    assert!(matches!(err, SessionError::AmbiguousResult(_)));
    assert_eq!(index.find_by_session(session_id).await?.len(), 2);

    let entity = index.find_active_by_work_item_id(1).await?;
    let mut session = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, entity.session_id)
        .await?;
    register_indexing(&mut session, Some(PATTERN_KEY));
    coordinator.complete(session, &entity, None).await?;

    let by_process = index.find_active_by_process_id(2).await?;
    assert_eq!(by_process.len(), 1);
    assert_eq!(by_process[0].work_item_id, 2);
    assert_eq!(by_process[0].process_id, 2);
    Ok(())
}

#[tokio::test]
async fn test_rules_do_not_fire_for_non_matching_facts() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, None);
    session.insert(person("Junior", 12)).await?;

    assert_eq!(session.fire_all_rules().await?, 0);
    assert!(session.process_instances()?.is_empty());
    assert!(db.index().find_all_active().await?.is_empty());
    Ok(())
}

/// A completed task moves the process on to its second task
#[tokio::test]
async fn test_completion_reaches_second_task() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let index = db.index();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, "salaboy", vec![process_one()])
        .await?;
    register_indexing(&mut session, Some("salaboy"));
    let instance_id = session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let entity = index.find_active_by_key("salaboy").await?;
    assert_eq!(instance_id, 1);
    assert_eq!(entity.process_id, 1);
    assert_eq!(entity.work_item_id, 1);

    let mut session = lifecycle
        .load_session_by_key(&kbases, "salaboy", session_id)
        .await?;
    register_indexing(&mut session, Some("salaboy"));
    db.coordinator().complete(session, &entity, None).await?;

    let active = index.find_all_active().await?;
    let inactive = index.find_all_inactive().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].work_item_id, 2);
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].work_item_id, 1);
    assert!(inactive[0].deactivated_at.is_some());
    Ok(())
}

/// Completing the last task ends the process
#[tokio::test]
async fn test_completing_last_task_completes_process() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let index = db.index();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, "single", vec![single_task_process()])
        .await?;
    register_indexing(&mut session, Some("single"));
    session
        .start_process("single.task", person_params("Salaboy", 29))
        .await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let entity = index.find_active_by_key("single").await?;
    let mut session = lifecycle.load_session_by_key(&kbases, "single", session_id).await?;
    register_indexing(&mut session, Some("single"));
    let outcome = db.coordinator().complete(session, &entity, None).await?;

    assert!(outcome.process_completed);
    assert!(outcome.created_work_items.is_empty());
    assert!(index.find_all_active().await?.is_empty());

    let session = lifecycle.load_session_by_key(&kbases, "single", session_id).await?;
    assert!(session.process_instances()?.is_empty());
    assert!(session.pending_work_items()?.is_empty());
    Ok(())
}

/// Independent sessions never see each other's work items
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_independent_sessions_run_concurrently() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut first = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    let mut second = lifecycle.new_session(kbases.require(PATTERN_KEY)?).await?;
    register_indexing(&mut first, Some("first"));
    register_indexing(&mut second, Some("second"));

    let (a, b) = tokio::join!(
        first.start_process(PROCESS_ID, person_params("First", 30)),
        second.start_process(PROCESS_ID, person_params("Second", 40)),
    );
    a?;
    b?;

    let index = db.index();
    let first_entity = index.find_active_by_key("first").await?;
    let second_entity = index.find_active_by_key("second").await?;

    assert_ne!(first_entity.session_id, second_entity.session_id);
    assert_ne!(first_entity.work_item_id, second_entity.work_item_id);
    assert_eq!(first_entity.session_id, first.id());
    assert!(first.work_item(first_entity.work_item_id)?.is_some());
    assert!(first.work_item(second_entity.work_item_id)?.is_none());
    assert!(second.work_item(first_entity.work_item_id)?.is_none());
    Ok(())
}

/// Instances in one session share its id
#[tokio::test]
async fn test_instances_in_one_session_share_session_id() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    register_indexing(&mut session, None);
    let one = session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    let two = session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    assert_ne!(one, two);

    let active = db.index().find_all_active().await?;
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|entity| entity.session_id == session.id()));
    Ok(())
}

#[tokio::test]
async fn test_work_item_parameters_follow_inputs() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    register_indexing(&mut session, None);
    session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;

    let pending = session.pending_work_items()?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "Human Task");
    assert_eq!(
        pending[0].parameters.get("subject"),
        Some(&VariableValue::Record(person("Salaboy", 29)))
    );
    Ok(())
}
