use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::{debug, info};

use crate::database::TransactionScope;
use crate::error::{Result, SessionError};

const SELECT_COLUMNS: &str = r#"
    SELECT id, business_key, session_id, process_id, work_item_id, active, created_at, deactivated_at
    FROM business_entities
"#;

/// Index row linking a business key and a pending work item to the session
/// that is suspended on it.
/// Maps to `business_entities` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BusinessEntity {
    pub id: i64,
    pub business_key: Option<String>,
    pub session_id: i64,
    /// Process instance waiting on the work item
    pub process_id: i64,
    pub work_item_id: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// New BusinessEntity for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBusinessEntity {
    pub business_key: Option<String>,
    pub session_id: i64,
    pub process_id: i64,
    pub work_item_id: i64,
}

impl BusinessEntity {
    /// Insert an active row. No deduplication happens here; a second active row
    /// for the same work item is rejected by the storage constraint.
    pub async fn insert<'e, E>(executor: E, new_entity: NewBusinessEntity) -> Result<BusinessEntity>
    where
        E: SqliteExecutor<'e>,
    {
        let entity = sqlx::query_as::<_, BusinessEntity>(
            r#"
            INSERT INTO business_entities (business_key, session_id, process_id, work_item_id, active, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            RETURNING id, business_key, session_id, process_id, work_item_id, active, created_at, deactivated_at
            "#,
        )
        .bind(new_entity.business_key)
        .bind(new_entity.session_id)
        .bind(new_entity.process_id)
        .bind(new_entity.work_item_id)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

        info!(
            entity_id = entity.id,
            business_key = ?entity.business_key,
            session_id = entity.session_id,
            work_item_id = entity.work_item_id,
            "Business entity recorded"
        );

        Ok(entity)
    }

    /// Find a business entity by ID
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        let entity = sqlx::query_as::<_, BusinessEntity>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(entity)
    }

    /// The single active entity with the given business key
    pub async fn find_active_by_key<'e, E>(executor: E, key: &str) -> Result<BusinessEntity>
    where
        E: SqliteExecutor<'e>,
    {
        let matches = sqlx::query_as::<_, BusinessEntity>(&format!(
            "{SELECT_COLUMNS} WHERE business_key = ?1 AND active = 1 ORDER BY id"
        ))
        .bind(key)
        .fetch_all(executor)
        .await?;

        exactly_one(matches, || format!("business key '{key}'"))
    }

    /// The single active entity for a pending work item
    pub async fn find_active_by_work_item_id<'e, E>(
        executor: E,
        work_item_id: i64,
    ) -> Result<BusinessEntity>
    where
        E: SqliteExecutor<'e>,
    {
        let matches = sqlx::query_as::<_, BusinessEntity>(&format!(
            "{SELECT_COLUMNS} WHERE work_item_id = ?1 AND active = 1 ORDER BY id"
        ))
        .bind(work_item_id)
        .fetch_all(executor)
        .await?;

        exactly_one(matches, || format!("work item {work_item_id}"))
    }

    pub async fn find_all_active<'e, E>(executor: E) -> Result<Vec<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        Self::find_by_active_flag(executor, true).await
    }

    pub async fn find_all_inactive<'e, E>(executor: E) -> Result<Vec<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        Self::find_by_active_flag(executor, false).await
    }

    async fn find_by_active_flag<'e, E>(executor: E, active: bool) -> Result<Vec<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        let entities = sqlx::query_as::<_, BusinessEntity>(&format!(
            "{SELECT_COLUMNS} WHERE active = ?1 ORDER BY id"
        ))
        .bind(active)
        .fetch_all(executor)
        .await?;

        Ok(entities)
    }

    /// Active entities of one process instance
    pub async fn find_active_by_process_id<'e, E>(
        executor: E,
        process_id: i64,
    ) -> Result<Vec<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        let entities = sqlx::query_as::<_, BusinessEntity>(&format!(
            "{SELECT_COLUMNS} WHERE process_id = ?1 AND active = 1 ORDER BY id"
        ))
        .bind(process_id)
        .fetch_all(executor)
        .await?;

        Ok(entities)
    }

    /// Every entity, active or not, recorded for a session
    pub async fn find_by_session<'e, E>(executor: E, session_id: i64) -> Result<Vec<BusinessEntity>>
    where
        E: SqliteExecutor<'e>,
    {
        let entities = sqlx::query_as::<_, BusinessEntity>(&format!(
            "{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY id"
        ))
        .bind(session_id)
        .fetch_all(executor)
        .await?;

        Ok(entities)
    }

    /// Flip an active row to inactive. Inactive rows are never touched again.
    pub(crate) async fn deactivate(conn: &mut SqliteConnection, id: i64) -> Result<BusinessEntity> {
        let updated = sqlx::query_as::<_, BusinessEntity>(
            r#"
            UPDATE business_entities
            SET active = 0, deactivated_at = ?2
            WHERE id = ?1 AND active = 1
            RETURNING id, business_key, session_id, process_id, work_item_id, active, created_at, deactivated_at
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        match updated {
            Some(entity) => {
                debug!(entity_id = id, work_item_id = entity.work_item_id, "Business entity deactivated");
                Ok(entity)
            }
            None => match Self::find_by_id(&mut *conn, id).await? {
                Some(_) => Err(SessionError::invalid_state(format!(
                    "business entity {id} is already inactive"
                ))),
                None => Err(SessionError::not_found(format!("business entity {id}"))),
            },
        }
    }
}

fn exactly_one(
    mut matches: Vec<BusinessEntity>,
    describe: impl FnOnce() -> String,
) -> Result<BusinessEntity> {
    match matches.len() {
        0 => Err(SessionError::not_found(format!(
            "no active business entity for {}",
            describe()
        ))),
        1 => Ok(matches.remove(0)),
        n => Err(SessionError::AmbiguousResult(format!(
            "{} active business entities for {}",
            n,
            describe()
        ))),
    }
}

/// Read side of the business entity index plus transactional deactivation
#[derive(Debug, Clone)]
pub struct BusinessEntityIndex {
    pool: SqlitePool,
}

impl BusinessEntityIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<BusinessEntity>> {
        BusinessEntity::find_by_id(&self.pool, id).await
    }

    pub async fn find_active_by_key(&self, key: &str) -> Result<BusinessEntity> {
        BusinessEntity::find_active_by_key(&self.pool, key).await
    }

    pub async fn find_active_by_work_item_id(&self, work_item_id: i64) -> Result<BusinessEntity> {
        BusinessEntity::find_active_by_work_item_id(&self.pool, work_item_id).await
    }

    pub async fn find_all_active(&self) -> Result<Vec<BusinessEntity>> {
        BusinessEntity::find_all_active(&self.pool).await
    }

    pub async fn find_all_inactive(&self) -> Result<Vec<BusinessEntity>> {
        BusinessEntity::find_all_inactive(&self.pool).await
    }

    pub async fn find_active_by_process_id(&self, process_id: i64) -> Result<Vec<BusinessEntity>> {
        BusinessEntity::find_active_by_process_id(&self.pool, process_id).await
    }

    pub async fn find_by_session(&self, session_id: i64) -> Result<Vec<BusinessEntity>> {
        BusinessEntity::find_by_session(&self.pool, session_id).await
    }

    /// Deactivate an entity as part of the caller's transaction. Fails with
    /// `InvalidState` if the entity is already inactive.
    pub async fn deactivate(scope: &mut TransactionScope, entity_id: i64) -> Result<BusinessEntity> {
        BusinessEntity::deactivate(scope.connection(), entity_id).await
    }
}
