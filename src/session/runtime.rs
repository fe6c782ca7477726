//! Execution of process instances inside one transaction.
//!
//! The runtime moves instances from node to node until each reaches a
//! suspension point (a task) or an end node. All durable side effects (id
//! allocation, handler writes) go through the operation's transaction scope;
//! the caller persists the mutated state and decides commit or rollback.

use chrono::Utc;
use tracing::{debug, info};

use super::state::{Activation, FactHandle, ProcessInstance, SessionState};
use crate::constants::sequences::{PROCESS_INSTANCE, WORK_ITEM};
use crate::constants::{events, ProcessInstanceStatus, WorkItemState};
use crate::database::{sequences, TransactionScope};
use crate::definitions::{KnowledgeBase, Node, ProcessDefinition, Record, TaskNode, VariableValue, Variables};
use crate::error::{Result, SessionError};
use crate::logging::log_work_item_operation;
use crate::work_items::{HandlerContext, WorkItem, WorkItemCompletion, WorkItemHandlerRegistry};

pub(crate) struct Runtime<'a> {
    pub session_id: i64,
    pub kbase: &'a KnowledgeBase,
    pub handlers: &'a WorkItemHandlerRegistry,
    pub state: &'a mut SessionState,
    pub scope: &'a mut TransactionScope,
    /// Work items created so far by this operation
    pub created_work_items: Vec<i64>,
}

impl Runtime<'_> {
    pub async fn start_process(&mut self, process_id: &str, variables: Variables) -> Result<i64> {
        let kbase = self.kbase;
        let process = kbase.require_process(process_id)?;
        process.validate_start_variables(&variables)?;

        let instance_id = sequences::next_value(self.scope.connection(), PROCESS_INSTANCE).await?;
        self.state.process_instances.insert(
            instance_id,
            ProcessInstance {
                id: instance_id,
                process_id: process.id.clone(),
                status: ProcessInstanceStatus::Active,
                current_node: process.start_node.clone(),
                pending_work_item: None,
                variables,
                started_at: Utc::now(),
            },
        );

        info!(
            session_id = self.session_id,
            process_instance_id = instance_id,
            process_id = %process.id,
            "{}", events::PROCESS_STARTED
        );

        self.advance(instance_id).await?;
        Ok(instance_id)
    }

    pub fn insert(&mut self, fact: Record) -> Result<FactHandle> {
        if !fact.is_finite() {
            return Err(SessionError::validation(format!(
                "{} fact holds a non-finite number",
                fact.type_name
            )));
        }
        let handle = self.state.insert_fact(fact);
        debug!(session_id = self.session_id, fact = %handle, "Fact inserted");
        Ok(handle)
    }

    /// Fire every rule activation that has not fired before. A fact fires a
    /// given rule at most once over the whole life of the session.
    pub async fn fire_all_rules(&mut self) -> Result<usize> {
        let kbase = self.kbase;
        let mut fired = 0;

        for rule in kbase.rules() {
            let rule_name = rule.full_name();
            let pending: Vec<(FactHandle, Record)> = self
                .state
                .facts
                .iter()
                .filter(|(handle, fact)| {
                    rule.matches(fact)
                        && !self.state.fired_activations.contains(&Activation {
                            rule: rule_name.clone(),
                            fact: **handle,
                        })
                })
                .map(|(handle, fact)| (*handle, fact.clone()))
                .collect();

            for (handle, fact) in pending {
                self.state.fired_activations.insert(Activation {
                    rule: rule_name.clone(),
                    fact: handle,
                });

                let mut variables = Variables::new();
                variables.insert(rule.bind_as.clone(), VariableValue::Record(fact));
                let instance_id = self.start_process(&rule.start_process, variables).await?;
                fired += 1;

                info!(
                    session_id = self.session_id,
                    rule = %rule_name,
                    fact = %handle,
                    process_instance_id = instance_id,
                    "{}", events::RULE_FIRED
                );
            }
        }

        Ok(fired)
    }

    pub async fn complete_work_item(
        &mut self,
        work_item_id: i64,
        results: Option<Variables>,
    ) -> Result<WorkItemCompletion> {
        let kbase = self.kbase;
        let item = self
            .state
            .work_items
            .remove(&work_item_id)
            .filter(WorkItem::is_pending)
            .ok_or_else(|| {
                SessionError::not_found(format!(
                    "pending work item {work_item_id} in session {}",
                    self.session_id
                ))
            })?;

        let process = kbase.require_process(&item.process_id)?;
        let task = process.task(&item.node_id).ok_or_else(|| SessionError::StateMismatch {
            session_id: self.session_id,
            reason: format!("work item {} is not at a task node", item.id),
        })?;

        let instance = self
            .state
            .process_instances
            .get_mut(&item.process_instance_id)
            .ok_or_else(|| {
                SessionError::invalid_state(format!(
                    "work item {} belongs to process instance {} which is no longer active",
                    item.id, item.process_instance_id
                ))
            })?;

        if let Some(results) = results {
            apply_outputs(process, task, &results, &mut instance.variables)?;
        }

        instance.pending_work_item = None;
        instance.status = ProcessInstanceStatus::Active;
        instance.current_node = next_node(process, &item.node_id)?;

        log_work_item_operation(
            events::WORK_ITEM_COMPLETED,
            Some(self.session_id),
            Some(item.process_instance_id),
            Some(item.id),
            Some(&item.name),
            "completed",
        );

        let created_before = self.created_work_items.len();
        self.advance(item.process_instance_id).await?;

        Ok(WorkItemCompletion {
            work_item_id,
            process_instance_id: item.process_instance_id,
            created_work_items: self.created_work_items[created_before..].to_vec(),
            process_completed: !self
                .state
                .process_instances
                .contains_key(&item.process_instance_id),
        })
    }

    /// Remove an instance and tell the handler of its pending work item
    pub async fn abort_process_instance(&mut self, instance_id: i64) -> Result<()> {
        let instance = self
            .state
            .process_instances
            .remove(&instance_id)
            .ok_or_else(|| SessionError::not_found(format!("process instance {instance_id}")))?;

        if let Some(work_item_id) = instance.pending_work_item {
            if let Some(mut item) = self.state.work_items.remove(&work_item_id) {
                item.state = WorkItemState::Aborted;
                let handler = self.handlers.require(&item.name, self.session_id)?;
                let mut ctx =
                    HandlerContext::new(self.session_id, self.scope.id(), self.scope.connection());
                handler.on_abort(&item, &mut ctx).await?;
            }
        }

        info!(
            session_id = self.session_id,
            process_instance_id = instance_id,
            "{}", events::PROCESS_ABORTED
        );
        Ok(())
    }

    /// Run an instance until it waits on a task or finishes
    async fn advance(&mut self, instance_id: i64) -> Result<()> {
        let kbase = self.kbase;

        loop {
            let instance = self
                .state
                .process_instances
                .get_mut(&instance_id)
                .ok_or_else(|| SessionError::not_found(format!("process instance {instance_id}")))?;
            let process = kbase.require_process(&instance.process_id)?;
            let node_id = instance.current_node.clone();

            match process.node(&node_id) {
                Some(Node::Start) => {
                    instance.current_node = next_node(process, &node_id)?;
                }
                Some(Node::Task(task)) => {
                    return self.enter_task(instance_id, process, &node_id, task).await;
                }
                Some(Node::End) => {
                    self.state.process_instances.remove(&instance_id);
                    info!(
                        session_id = self.session_id,
                        process_instance_id = instance_id,
                        "{}", events::PROCESS_COMPLETED
                    );
                    return Ok(());
                }
                None => {
                    return Err(SessionError::StateMismatch {
                        session_id: self.session_id,
                        reason: format!(
                            "process '{}' has no node '{}'",
                            process.id, node_id
                        ),
                    });
                }
            }
        }
    }

    async fn enter_task(
        &mut self,
        instance_id: i64,
        process: &ProcessDefinition,
        node_id: &str,
        task: &TaskNode,
    ) -> Result<()> {
        // Without a handler nothing could ever record this suspension point
        let handler = self.handlers.require(&task.task_type, self.session_id)?;
        let work_item_id = sequences::next_value(self.scope.connection(), WORK_ITEM).await?;

        let instance = self
            .state
            .process_instances
            .get_mut(&instance_id)
            .ok_or_else(|| SessionError::not_found(format!("process instance {instance_id}")))?;

        let parameters: Variables = task
            .inputs
            .iter()
            .map(|(parameter, variable)| {
                (
                    parameter.clone(),
                    instance
                        .variables
                        .get(variable)
                        .cloned()
                        .unwrap_or(VariableValue::Null),
                )
            })
            .collect();

        let work_item = WorkItem {
            id: work_item_id,
            session_id: self.session_id,
            process_instance_id: instance_id,
            process_id: process.id.clone(),
            node_id: node_id.to_string(),
            name: task.task_type.clone(),
            parameters,
            state: WorkItemState::Pending,
            created_at: Utc::now(),
        };

        instance.status = ProcessInstanceStatus::Suspended;
        instance.pending_work_item = Some(work_item_id);
        self.state.work_items.insert(work_item_id, work_item.clone());
        self.created_work_items.push(work_item_id);

        let mut ctx = HandlerContext::new(self.session_id, self.scope.id(), self.scope.connection());
        handler.on_start(&work_item, &mut ctx).await?;

        debug!(
            session_id = self.session_id,
            process_instance_id = instance_id,
            work_item_id = work_item_id,
            task = %task.name,
            handler = handler.handler_name(),
            "Process instance suspended"
        );
        Ok(())
    }
}

fn next_node(process: &ProcessDefinition, node_id: &str) -> Result<String> {
    process
        .next_node(node_id)
        .map(str::to_string)
        .ok_or_else(|| {
            SessionError::invalid_state(format!(
                "process '{}' has no flow out of '{}'",
                process.id, node_id
            ))
        })
}

/// Copy declared task outputs from the results into process variables.
/// Result keys the task does not declare are ignored.
fn apply_outputs(
    process: &ProcessDefinition,
    task: &TaskNode,
    results: &Variables,
    variables: &mut Variables,
) -> Result<()> {
    for (key, variable) in &task.outputs {
        let Some(value) = results.get(key) else {
            continue;
        };
        if !value.is_finite() {
            return Err(SessionError::validation(format!(
                "result '{}' of task '{}' holds a non-finite number",
                key, task.name
            )));
        }
        if let Some(declaration) = process.variable(variable) {
            if !declaration.kind.accepts(value) {
                return Err(SessionError::validation(format!(
                    "result '{}' of task '{}' is {}, but variable '{}' expects {}",
                    key,
                    task.name,
                    value.kind_name(),
                    variable,
                    declaration.kind
                )));
            }
        }
        variables.insert(variable.clone(), value.clone());
    }
    Ok(())
}
