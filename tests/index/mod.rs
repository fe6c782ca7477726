//! Business Entity Index Tests

use crate::common::*;
use process_sessions::definitions::KnowledgeBaseTable;
use process_sessions::models::{BusinessEntity, BusinessEntityIndex, NewBusinessEntity};
use process_sessions::{Result, SessionError};

async fn session_row(db: &TestDatabase) -> Result<i64> {
    let mut kbases = KnowledgeBaseTable::new();
    let mut session = db
        .lifecycle()
        .create_session(&mut kbases, PATTERN_KEY, vec![process_one()])
        .await?;
    let id = session.id();
    session.dispose()?;
    Ok(id)
}

fn entity(key: Option<&str>, session_id: i64, process_id: i64, work_item_id: i64) -> NewBusinessEntity {
    NewBusinessEntity {
        business_key: key.map(str::to_string),
        session_id,
        process_id,
        work_item_id,
    }
}

#[tokio::test]
async fn test_find_active_by_key_requires_exactly_one_match() -> Result<()> {
    let db = TestDatabase::new().await;
    let session_id = session_row(&db).await?;
    let pool = db.env.pool();
    let index = db.index();

    let missing = index.find_active_by_key("nobody").await.unwrap_err();
    assert!(matches!(missing, SessionError::NotFound(_)));

    BusinessEntity::insert(pool, entity(Some("shared"), session_id, 1, 1)).await?;
    let found = index.find_active_by_key("shared").await?;
    assert_eq!(found.work_item_id, 1);

    BusinessEntity::insert(pool, entity(Some("shared"), session_id, 2, 2)).await?;
    let ambiguous = index.find_active_by_key("shared").await.unwrap_err();
    assert!(matches!(ambiguous, SessionError::AmbiguousResult(_)));
    Ok(())
}

#[tokio::test]
async fn test_inactive_rows_are_invisible_to_active_queries() -> Result<()> {
    let db = TestDatabase::new().await;
    let session_id = session_row(&db).await?;
    let index = db.index();

    let first = BusinessEntity::insert(db.env.pool(), entity(Some("key"), session_id, 7, 1)).await?;
    BusinessEntity::insert(db.env.pool(), entity(Some("other"), session_id, 7, 2)).await?;

    let mut scope = db.env.transactions().begin().await?;
    let deactivated = BusinessEntityIndex::deactivate(&mut scope, first.id).await?;
    scope.commit().await?;
    assert!(!deactivated.active);

    assert!(index.find_active_by_key("key").await.unwrap_err().is_not_found());
    assert!(index.find_active_by_work_item_id(1).await.unwrap_err().is_not_found());
    assert_eq!(index.find_active_by_process_id(7).await?.len(), 1);
    assert_eq!(index.find_all_inactive().await?.len(), 1);
    assert_eq!(index.find_by_session(session_id).await?.len(), 2);

    let audited = index.find_by_id(first.id).await?.expect("row kept");
    assert!(!audited.active);
    assert!(audited.deactivated_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_deactivation_is_monotonic() -> Result<()> {
    let db = TestDatabase::new().await;
    let session_id = session_row(&db).await?;
    let row = BusinessEntity::insert(db.env.pool(), entity(None, session_id, 1, 1)).await?;

    let mut scope = db.env.transactions().begin().await?;
    BusinessEntityIndex::deactivate(&mut scope, row.id).await?;
    scope.commit().await?;
    let first = db.index().find_by_id(row.id).await?.expect("row");

    let mut scope = db.env.transactions().begin().await?;
    let err = BusinessEntityIndex::deactivate(&mut scope, row.id).await.unwrap_err();
    scope.rollback().await?;
    assert!(matches!(err, SessionError::InvalidState(_)));

    // Second attempt changed nothing, including the audit timestamp
    let second = db.index().find_by_id(row.id).await?.expect("row");
    assert_eq!(first, second);

    let mut scope = db.env.transactions().begin().await?;
    let err = BusinessEntityIndex::deactivate(&mut scope, 9_999).await.unwrap_err();
    scope.rollback().await?;
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_at_most_one_active_row_per_work_item() -> Result<()> {
    let db = TestDatabase::new().await;
    let session_id = session_row(&db).await?;
    let pool = db.env.pool();

    let first = BusinessEntity::insert(pool, entity(Some("a"), session_id, 1, 5)).await?;
    let duplicate = BusinessEntity::insert(pool, entity(Some("b"), session_id, 1, 5)).await;
    assert!(matches!(duplicate, Err(SessionError::Database(_))));

    // Once the first is inactive the work item id may be indexed again
    let mut scope = db.env.transactions().begin().await?;
    BusinessEntityIndex::deactivate(&mut scope, first.id).await?;
    scope.commit().await?;
    BusinessEntity::insert(pool, entity(Some("b"), session_id, 1, 5)).await?;

    assert_eq!(db.index().find_active_by_work_item_id(5).await?.business_key.as_deref(), Some("b"));
    Ok(())
}

#[tokio::test]
async fn test_uncommitted_deactivation_rolls_back() -> Result<()> {
    let db = TestDatabase::new().await;
    let session_id = session_row(&db).await?;
    let row = BusinessEntity::insert(db.env.pool(), entity(None, session_id, 1, 1)).await?;

    {
        let mut scope = db.env.transactions().begin().await?;
        BusinessEntityIndex::deactivate(&mut scope, row.id).await?;
        // Dropped without commit
    }

    let reloaded = db.index().find_active_by_work_item_id(1).await?;
    assert!(reloaded.active);
    Ok(())
}
