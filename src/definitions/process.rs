//! Process definition documents and their compiled form.
//!
//! A process is a straight line of nodes: one `start`, any number of `task`
//! nodes that suspend on external work, and one or more `end` nodes. Every
//! node except an end has exactly one outgoing flow.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use super::values::{VariableKind, VariableValue, Variables};
use crate::error::{Diagnostic, Result, SessionError};

// ── Document shape ──

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDocument>,
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub flows: Vec<FlowDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableDocument {
    pub name: String,
    #[serde(rename = "type", default = "default_variable_type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

fn default_variable_type() -> String {
    "any".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDocument {
    Start {
        id: String,
    },
    Task {
        id: String,
        #[serde(default)]
        name: Option<String>,
        task_type: String,
        #[serde(default)]
        inputs: BTreeMap<String, String>,
        #[serde(default)]
        outputs: BTreeMap<String, String>,
    },
    End {
        id: String,
    },
}

impl NodeDocument {
    pub fn id(&self) -> &str {
        match self {
            Self::Start { id } | Self::Task { id, .. } | Self::End { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowDocument {
    pub from: String,
    pub to: String,
}

// ── Compiled definition ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDeclaration {
    pub name: String,
    pub kind: VariableKind,
    pub required: bool,
}

/// External task reached by a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub name: String,
    pub task_type: String,
    /// Work item parameter name -> process variable
    pub inputs: BTreeMap<String, String>,
    /// Result key -> process variable
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Start,
    Task(TaskNode),
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDefinition {
    pub id: String,
    pub name: String,
    pub variables: Vec<VariableDeclaration>,
    pub nodes: BTreeMap<String, Node>,
    pub start_node: String,
    /// Node id -> the single node it flows to
    pub transitions: BTreeMap<String, String>,
}

impl ProcessDefinition {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn task(&self, node_id: &str) -> Option<&TaskNode> {
        match self.nodes.get(node_id) {
            Some(Node::Task(task)) => Some(task),
            _ => None,
        }
    }

    pub fn next_node(&self, node_id: &str) -> Option<&str> {
        self.transitions.get(node_id).map(String::as_str)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDeclaration> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Task types of every task node
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.nodes.values().filter_map(|node| match node {
            Node::Task(task) => Some(task.task_type.as_str()),
            _ => None,
        })
    }

    /// Check start parameters against the declared variables
    pub fn validate_start_variables(&self, variables: &Variables) -> Result<()> {
        for (name, value) in variables {
            let declaration = self.variable(name).ok_or_else(|| {
                SessionError::validation(format!(
                    "process '{}' does not declare variable '{}'",
                    self.id, name
                ))
            })?;

            if !value.is_finite() {
                return Err(SessionError::validation(format!(
                    "variable '{}' of process '{}' holds a non-finite number",
                    name, self.id
                )));
            }

            if !declaration.kind.accepts(value) {
                return Err(SessionError::validation(format!(
                    "variable '{}' of process '{}' expects {}, got {}",
                    name,
                    self.id,
                    declaration.kind,
                    value.kind_name()
                )));
            }
        }

        for declaration in self.variables.iter().filter(|v| v.required) {
            match variables.get(&declaration.name) {
                None | Some(VariableValue::Null) => {
                    return Err(SessionError::validation(format!(
                        "process '{}' requires variable '{}'",
                        self.id, declaration.name
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Parse and validate one process document, reporting every problem found
pub fn compile_process(
    resource: &str,
    content: &str,
) -> std::result::Result<ProcessDefinition, Vec<Diagnostic>> {
    let document: ProcessDocument = serde_yaml::from_str(content).map_err(|e| {
        vec![Diagnostic::new(
            resource,
            format!("invalid process document: {e}"),
        )]
    })?;

    let mut diagnostics = Vec::new();
    let mut report = |message: String| diagnostics.push(Diagnostic::new(resource, message));

    if document.id.trim().is_empty() {
        report("process id must not be empty".to_string());
    }

    // Variables
    let mut variables = Vec::new();
    let mut declared = BTreeSet::new();
    for variable in &document.variables {
        if !declared.insert(variable.name.as_str()) {
            report(format!(
                "process '{}': variable '{}' is declared more than once",
                document.id, variable.name
            ));
            continue;
        }
        match VariableKind::parse(&variable.kind) {
            Some(kind) => variables.push(VariableDeclaration {
                name: variable.name.clone(),
                kind,
                required: variable.required,
            }),
            None => report(format!(
                "process '{}': variable '{}' has an empty type",
                document.id, variable.name
            )),
        }
    }

    // Nodes
    let mut nodes = BTreeMap::new();
    let mut start_nodes = Vec::new();
    let mut end_count = 0;
    for node in &document.nodes {
        if nodes.contains_key(node.id()) {
            report(format!(
                "process '{}': duplicate node id '{}'",
                document.id,
                node.id()
            ));
            continue;
        }

        let compiled = match node {
            NodeDocument::Start { id } => {
                start_nodes.push(id.clone());
                Node::Start
            }
            NodeDocument::End { .. } => {
                end_count += 1;
                Node::End
            }
            NodeDocument::Task {
                id,
                name,
                task_type,
                inputs,
                outputs,
            } => {
                if task_type.trim().is_empty() {
                    report(format!(
                        "process '{}': task '{}' has an empty task_type",
                        document.id, id
                    ));
                }
                for variable in inputs.values() {
                    if !declared.contains(variable.as_str()) {
                        report(format!(
                            "process '{}': task '{}' input reads undeclared variable '{}'",
                            document.id, id, variable
                        ));
                    }
                }
                for variable in outputs.values() {
                    if !declared.contains(variable.as_str()) {
                        report(format!(
                            "process '{}': task '{}' output writes undeclared variable '{}'",
                            document.id, id, variable
                        ));
                    }
                }
                Node::Task(TaskNode {
                    name: name.clone().unwrap_or_else(|| id.clone()),
                    task_type: task_type.clone(),
                    inputs: inputs.clone(),
                    outputs: outputs.clone(),
                })
            }
        };
        nodes.insert(node.id().to_string(), compiled);
    }

    if start_nodes.len() != 1 {
        report(format!(
            "process '{}': expected exactly one start node, found {}",
            document.id,
            start_nodes.len()
        ));
    }
    if end_count == 0 {
        report(format!("process '{}': no end node found", document.id));
    }

    // Flows
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for flow in &document.flows {
        let mut known = true;
        for endpoint in [&flow.from, &flow.to] {
            if !nodes.contains_key(endpoint.as_str()) {
                report(format!(
                    "process '{}': flow {} -> {} references unknown node '{}'",
                    document.id, flow.from, flow.to, endpoint
                ));
                known = false;
            }
        }
        if !known {
            continue;
        }

        if matches!(nodes.get(flow.to.as_str()), Some(Node::Start)) {
            report(format!(
                "process '{}': start node '{}' cannot have incoming flows",
                document.id, flow.to
            ));
        }
        if matches!(nodes.get(flow.from.as_str()), Some(Node::End)) {
            report(format!(
                "process '{}': end node '{}' cannot have outgoing flows",
                document.id, flow.from
            ));
            continue;
        }
        outgoing
            .entry(flow.from.as_str())
            .or_default()
            .push(flow.to.as_str());
    }

    let mut transitions = BTreeMap::new();
    for (id, node) in &nodes {
        if matches!(node, Node::End) {
            continue;
        }
        match outgoing.get(id.as_str()).map(Vec::as_slice) {
            Some([target]) => {
                transitions.insert(id.clone(), target.to_string());
            }
            other => report(format!(
                "process '{}': node '{}' must have exactly one outgoing flow, found {}",
                document.id,
                id,
                other.map_or(0, |targets| targets.len())
            )),
        }
    }

    // Reachability from the start node
    if let [start] = start_nodes.as_slice() {
        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([start.as_str()]);
        while let Some(id) = queue.pop_front() {
            if reached.insert(id) {
                if let Some(targets) = outgoing.get(id) {
                    queue.extend(targets.iter().copied());
                }
            }
        }
        for id in nodes.keys() {
            if !reached.contains(id.as_str()) {
                report(format!(
                    "process '{}': node '{}' is unreachable from the start node",
                    document.id, id
                ));
            }
        }
    }

    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let start_node = start_nodes.remove(0);
    Ok(ProcessDefinition {
        name: document.name.clone().unwrap_or_else(|| document.id.clone()),
        id: document.id,
        variables,
        nodes,
        start_node,
        transitions,
    })
}
