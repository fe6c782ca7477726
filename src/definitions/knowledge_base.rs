//! # Knowledge Base
//!
//! Compiles definition resources into an immutable [`KnowledgeBase`] shared by
//! every session created from it, and the caller-owned [`KnowledgeBaseTable`]
//! that pairs knowledge bases with lookup keys.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::process::{compile_process, ProcessDefinition};
use super::rules::{compile_rules, Rule};
use super::values::VariableKind;
use crate::error::{Diagnostic, Result, SessionError};

/// Kind of definition document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Process,
    Rules,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Rules => write!(f, "rules"),
        }
    }
}

/// A named definition document waiting to be compiled
#[derive(Debug, Clone)]
pub struct DefinitionResource {
    name: String,
    resource_type: ResourceType,
    content: String,
    read_error: Option<String>,
}

impl DefinitionResource {
    pub fn new(
        name: impl Into<String>,
        resource_type: ResourceType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type,
            content: content.into(),
            read_error: None,
        }
    }

    /// Read a resource from disk. A read failure is kept and reported as a
    /// compile diagnostic when the resource is built.
    pub fn from_path(path: impl AsRef<Path>, resource_type: ResourceType) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match std::fs::read_to_string(path) {
            Ok(content) => Self::new(name, resource_type, content),
            Err(e) => Self {
                name,
                resource_type,
                content: String::new(),
                read_error: Some(format!("cannot read {}: {}", path.display(), e)),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Collects resources and compiles them into a knowledge base
#[derive(Debug, Default)]
pub struct KnowledgeBuilder {
    resources: Vec<DefinitionResource>,
}

impl KnowledgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: DefinitionResource) -> &mut Self {
        self.resources.push(resource);
        self
    }

    pub fn add_all(&mut self, resources: impl IntoIterator<Item = DefinitionResource>) -> &mut Self {
        self.resources.extend(resources);
        self
    }

    /// Compile every resource. Fails with all diagnostics from all resources
    /// if any of them is invalid; nothing is built partially.
    pub fn build(&self) -> Result<Arc<KnowledgeBase>> {
        let mut diagnostics = Vec::new();
        let mut processes: BTreeMap<String, ProcessDefinition> = BTreeMap::new();
        let mut process_sources: HashMap<String, String> = HashMap::new();
        let mut rules: Vec<Rule> = Vec::new();

        for resource in &self.resources {
            if let Some(error) = &resource.read_error {
                diagnostics.push(Diagnostic::new(&resource.name, error.clone()));
                continue;
            }

            match resource.resource_type {
                ResourceType::Process => match compile_process(&resource.name, &resource.content) {
                    Ok(process) => {
                        if let Some(first) = process_sources.get(&process.id) {
                            diagnostics.push(Diagnostic::new(
                                &resource.name,
                                format!(
                                    "process '{}' is already defined in '{}'",
                                    process.id, first
                                ),
                            ));
                        } else {
                            process_sources.insert(process.id.clone(), resource.name.clone());
                            processes.insert(process.id.clone(), process);
                        }
                    }
                    Err(found) => diagnostics.extend(found),
                },
                ResourceType::Rules => match compile_rules(&resource.name, &resource.content) {
                    Ok(compiled) => rules.extend(compiled),
                    Err(found) => diagnostics.extend(found),
                },
            }
        }

        Self::check_rule_references(&rules, &processes, &mut diagnostics);

        if !diagnostics.is_empty() {
            for diagnostic in &diagnostics {
                warn!(resource = %diagnostic.resource, "Definition error: {}", diagnostic.message);
            }
            return Err(SessionError::DefinitionCompile { diagnostics });
        }

        // Salience first, then declaration order with resources taken by name
        rules.sort_by(|a, b| {
            b.salience
                .cmp(&a.salience)
                .then_with(|| a.resource.cmp(&b.resource))
                .then_with(|| a.position.cmp(&b.position))
        });

        let fingerprint = compute_fingerprint(&processes, &rules)?;

        info!(
            processes = processes.len(),
            rules = rules.len(),
            fingerprint = %fingerprint,
            "Knowledge base built"
        );

        Ok(Arc::new(KnowledgeBase {
            processes,
            rules,
            fingerprint,
        }))
    }

    fn check_rule_references(
        rules: &[Rule],
        processes: &BTreeMap<String, ProcessDefinition>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let mut seen = BTreeMap::new();
        for rule in rules {
            if let Some(first) = seen.insert(rule.full_name(), rule.resource.as_str()) {
                if first != rule.resource {
                    diagnostics.push(Diagnostic::new(
                        &rule.resource,
                        format!(
                            "rule '{}' is already defined in '{}'",
                            rule.full_name(),
                            first
                        ),
                    ));
                }
            }

            let Some(process) = processes.get(&rule.start_process) else {
                diagnostics.push(Diagnostic::new(
                    &rule.resource,
                    format!(
                        "rule '{}' starts undefined process '{}'",
                        rule.name, rule.start_process
                    ),
                ));
                continue;
            };

            match process.variable(&rule.bind_as) {
                None => diagnostics.push(Diagnostic::new(
                    &rule.resource,
                    format!(
                        "rule '{}' binds to variable '{}' that process '{}' does not declare",
                        rule.name, rule.bind_as, process.id
                    ),
                )),
                Some(declaration)
                    if !matches!(&declaration.kind, VariableKind::Any)
                        && declaration.kind != VariableKind::Record(rule.fact_type.clone()) =>
                {
                    diagnostics.push(Diagnostic::new(
                        &rule.resource,
                        format!(
                            "rule '{}' binds a {} fact to variable '{}' of type {}",
                            rule.name, rule.fact_type, rule.bind_as, declaration.kind
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
    }
}

#[derive(Serialize)]
struct CanonicalKnowledge<'a> {
    processes: &'a BTreeMap<String, ProcessDefinition>,
    rules: Vec<&'a Rule>,
}

/// SHA-256 over a canonical serialization that does not depend on the order
/// resources were added in
fn compute_fingerprint(
    processes: &BTreeMap<String, ProcessDefinition>,
    rules: &[Rule],
) -> Result<String> {
    let mut canonical_rules: Vec<&Rule> = rules.iter().collect();
    canonical_rules.sort_by_key(|rule| rule.full_name());

    let canonical = serde_json::to_string(&CanonicalKnowledge {
        processes,
        rules: canonical_rules,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Immutable, compiled set of process and rule definitions
#[derive(Debug)]
pub struct KnowledgeBase {
    processes: BTreeMap<String, ProcessDefinition>,
    rules: Vec<Rule>,
    fingerprint: String,
}

impl KnowledgeBase {
    pub fn process(&self, process_id: &str) -> Option<&ProcessDefinition> {
        self.processes.get(process_id)
    }

    /// Like [`KnowledgeBase::process`] but a miss is an error
    pub fn require_process(&self, process_id: &str) -> Result<&ProcessDefinition> {
        self.process(process_id)
            .ok_or_else(|| SessionError::not_found(format!("process definition '{process_id}'")))
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessDefinition> {
        self.processes.values()
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Every task type used by some process
    pub fn task_types(&self) -> BTreeSet<String> {
        self.processes
            .values()
            .flat_map(|p| p.task_types())
            .map(str::to_string)
            .collect()
    }

    /// Content hash; equal knowledge bases have equal fingerprints
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Caller-owned table of knowledge bases by lookup key
#[derive(Debug, Default, Clone)]
pub struct KnowledgeBaseTable {
    entries: HashMap<String, Arc<KnowledgeBase>>,
}

impl KnowledgeBaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a knowledge base, returning the one previously under `key`
    pub fn register(
        &mut self,
        key: impl Into<String>,
        kbase: Arc<KnowledgeBase>,
    ) -> Option<Arc<KnowledgeBase>> {
        let key = key.into();
        debug!(key = %key, fingerprint = %kbase.fingerprint(), "Registering knowledge base");
        self.entries.insert(key, kbase)
    }

    pub fn get(&self, key: &str) -> Option<Arc<KnowledgeBase>> {
        self.entries.get(key).cloned()
    }

    pub fn require(&self, key: &str) -> Result<Arc<KnowledgeBase>> {
        self.get(key)
            .ok_or_else(|| SessionError::not_found(format!("knowledge base '{key}'")))
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
