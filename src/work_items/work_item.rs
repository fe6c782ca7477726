use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::WorkItemState;
use crate::definitions::Variables;

/// One unit of external work a process instance is suspended on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub session_id: i64,
    pub process_instance_id: i64,
    /// Definition id of the owning process
    pub process_id: String,
    pub node_id: String,
    /// Task type the handler is registered under
    pub name: String,
    pub parameters: Variables,
    pub state: WorkItemState,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn is_pending(&self) -> bool {
        self.state == WorkItemState::Pending
    }
}

/// What completing a work item did to its process instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemCompletion {
    pub work_item_id: i64,
    pub process_instance_id: i64,
    /// Work items reached while the instance ran to its next suspension point
    pub created_work_items: Vec<i64>,
    pub process_completed: bool,
}
