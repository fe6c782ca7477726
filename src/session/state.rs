//! Serializable runtime state of a session.
//!
//! Everything a session needs to resume is held here and written to
//! `session_info.state_data` as JSON on every state-changing operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constants::ProcessInstanceStatus;
use crate::definitions::{Record, Variables};
use crate::work_items::WorkItem;

/// Handle of a fact inserted into a session's working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactHandle(pub u64);

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fact#{}", self.0)
    }
}

/// A rule that has already fired for a fact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Activation {
    pub rule: String,
    pub fact: FactHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: i64,
    /// Definition id
    pub process_id: String,
    pub status: ProcessInstanceStatus,
    pub current_node: String,
    pub pending_work_item: Option<i64>,
    pub variables: Variables,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub process_instances: BTreeMap<i64, ProcessInstance>,
    pub work_items: BTreeMap<i64, WorkItem>,
    pub facts: BTreeMap<FactHandle, Record>,
    pub next_fact_handle: u64,
    pub fired_activations: BTreeSet<Activation>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            process_instances: BTreeMap::new(),
            work_items: BTreeMap::new(),
            facts: BTreeMap::new(),
            next_fact_handle: 1,
            fired_activations: BTreeSet::new(),
        }
    }
}

impl SessionState {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    /// Store a fact and hand out its handle
    pub fn insert_fact(&mut self, fact: Record) -> FactHandle {
        let handle = FactHandle(self.next_fact_handle);
        self.next_fact_handle += 1;
        self.facts.insert(handle, fact);
        handle
    }

    /// Process definition ids referenced by live instances and work items
    pub fn referenced_processes(&self) -> BTreeSet<&str> {
        self.process_instances
            .values()
            .map(|instance| instance.process_id.as_str())
            .chain(self.work_items.values().map(|item| item.process_id.as_str()))
            .collect()
    }

    pub fn pending_work_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.work_items.values().filter(|item| item.is_pending())
    }
}
