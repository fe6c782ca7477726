//! Handler that makes every suspension point findable through the business
//! entity index.

use async_trait::async_trait;
use tracing::debug;

use super::handler::{ExternalTaskHandler, HandlerContext};
use super::work_item::WorkItem;
use crate::config::SessionConfig;
use crate::constants::events;
use crate::error::Result;
use crate::logging::log_work_item_operation;
use crate::models::{BusinessEntity, NewBusinessEntity};

/// Records a [`BusinessEntity`] for each work item it starts, keyed by the
/// business key it was built with, and deactivates that row when the work
/// item is aborted.
#[derive(Debug, Clone, Default)]
pub struct IndexingTaskHandler {
    business_key: Option<String>,
}

impl IndexingTaskHandler {
    pub fn new(business_key: Option<String>) -> Self {
        Self { business_key }
    }

    pub fn with_key(business_key: impl Into<String>) -> Self {
        Self::new(Some(business_key.into()))
    }

    /// Use `business_key`, or the configured default when the caller has none
    pub fn from_config(config: &SessionConfig, business_key: Option<String>) -> Self {
        Self::new(business_key.or_else(|| config.default_business_key.clone()))
    }

    pub fn business_key(&self) -> Option<&str> {
        self.business_key.as_deref()
    }
}

#[async_trait]
impl ExternalTaskHandler for IndexingTaskHandler {
    async fn on_start(&self, work_item: &WorkItem, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let session_id = ctx.session_id();
        let entity = BusinessEntity::insert(
            ctx.connection(),
            NewBusinessEntity {
                business_key: self.business_key.clone(),
                session_id,
                process_id: work_item.process_instance_id,
                work_item_id: work_item.id,
            },
        )
        .await?;

        log_work_item_operation(
            events::WORK_ITEM_STARTED,
            Some(ctx.session_id()),
            Some(work_item.process_instance_id),
            Some(work_item.id),
            Some(&work_item.name),
            "indexed",
        );
        debug!(
            entity_id = entity.id,
            work_item_id = work_item.id,
            transaction_id = %ctx.transaction_id(),
            "{}", events::ENTITY_RECORDED
        );

        Ok(())
    }

    async fn on_abort(&self, work_item: &WorkItem, ctx: &mut HandlerContext<'_>) -> Result<()> {
        match BusinessEntity::find_active_by_work_item_id(ctx.connection(), work_item.id).await {
            Ok(entity) => {
                BusinessEntity::deactivate(ctx.connection(), entity.id).await?;
                log_work_item_operation(
                    events::WORK_ITEM_ABORTED,
                    Some(ctx.session_id()),
                    Some(work_item.process_instance_id),
                    Some(work_item.id),
                    Some(&work_item.name),
                    "deactivated",
                );
                Ok(())
            }
            // Nothing was indexed for this work item
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn handler_name(&self) -> &'static str {
        "IndexingTaskHandler"
    }
}
