//! Durable Session Store Tests

use crate::common::*;
use process_sessions::definitions::KnowledgeBaseTable;
use process_sessions::{Result, SessionError};

#[tokio::test]
async fn test_reload_restores_equivalent_state() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, Some("salaboy"));
    session
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;
    session.insert(person("Salaboy2", 31)).await?;
    session.fire_all_rules().await?;

    let before = session.state()?.clone();
    let version = session.version();
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let reloaded = lifecycle
        .load_session_by_key(&kbases, PATTERN_KEY, session_id)
        .await?;
    assert_eq!(reloaded.state()?, &before);
    assert_eq!(reloaded.version(), version);
    assert_eq!(reloaded.pending_work_items()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_every_operation_bumps_the_version() -> Result<()> {
    let db = TestDatabase::new().await;
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one(), start_rules()])
        .await?;
    register_indexing(&mut session, None);
    assert_eq!(session.version(), 0);

    session.insert(person("Salaboy", 29)).await?;
    assert_eq!(session.version(), 1);
    session.fire_all_rules().await?;
    assert_eq!(session.version(), 2);

    let stored = db.env.store().find(session.id()).await?.expect("row");
    assert_eq!(stored.version, 2);
    Ok(())
}

#[tokio::test]
async fn test_stale_holder_gets_concurrent_modification() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    let kbase = kbases.require(PATTERN_KEY)?;
    let mut holder_a = lifecycle.load_session(session_id, kbase.clone()).await?;
    let mut holder_b = lifecycle.load_session(session_id, kbase).await?;
    register_indexing(&mut holder_a, None);
    register_indexing(&mut holder_b, None);

    holder_a
        .start_process(PROCESS_ID, person_params("Salaboy", 29))
        .await?;

    let before = holder_b.state()?.clone();
    let err = holder_b
        .start_process(PROCESS_ID, person_params("Salaboy2", 29))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::ConcurrentModification { session_id: id, expected_version: 0 } if id == session_id
    ));

    // The losing attempt left nothing behind
    assert_eq!(holder_b.state()?, &before);
    assert_eq!(holder_b.version(), 0);
    assert_eq!(db.index().find_all_active().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_load_unknown_session_is_not_found() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let kbase = lifecycle.compile(vec![process_one()])?;

    let err = lifecycle.load_session(404, kbase).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_load_with_different_definitions_is_state_mismatch() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, "one", vec![process_one()])
        .await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    // Same process id, different contents
    let other = lifecycle.compile(vec![process_two()])?;
    let err = lifecycle.load_session(session_id, other).await.unwrap_err();
    assert!(matches!(err, SessionError::StateMismatch { session_id: id, .. } if id == session_id));
    Ok(())
}

#[tokio::test]
async fn test_load_matches_contents_not_lookup_key() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let mut kbases = KnowledgeBaseTable::new();

    let mut session = lifecycle
        .create_session(&mut kbases, "original-key", vec![process_one(), start_rules()])
        .await?;
    let session_id = session.id();
    lifecycle.dispose(&mut session)?;

    // Recompiled from the same files in a different order, under a new key
    let recompiled = lifecycle.compile(vec![start_rules(), process_one()])?;
    kbases.register("another-key", recompiled);

    let session = lifecycle
        .load_session_by_key(&kbases, "another-key", session_id)
        .await?;
    assert_eq!(session.id(), session_id);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_state_is_state_mismatch() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let kbase = lifecycle.compile(vec![process_one()])?;
    let session = lifecycle.new_session(kbase.clone()).await?;
    let session_id = session.id();
    drop(session);

    sqlx::query("UPDATE session_info SET state_data = '{\"not\": \"a session\"}' WHERE session_id = ?1")
        .bind(session_id)
        .execute(db.env.pool())
        .await?;

    let err = lifecycle.load_session(session_id, kbase).await.unwrap_err();
    assert!(matches!(err, SessionError::StateMismatch { .. }));
    Ok(())
}

#[tokio::test]
async fn test_dropping_session_keeps_stored_state() -> Result<()> {
    let db = TestDatabase::new().await;
    let lifecycle = db.lifecycle();
    let kbase = lifecycle.compile(vec![single_task_process()])?;

    let session_id = {
        let mut session = lifecycle.new_session(kbase.clone()).await?;
        register_indexing(&mut session, None);
        session
            .start_process("single.task", person_params("Salaboy", 29))
            .await?;
        session.id()
    };

    let session = lifecycle.load_session(session_id, kbase).await?;
    assert_eq!(session.process_instances()?.len(), 1);
    Ok(())
}
