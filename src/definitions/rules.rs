//! Rule definition documents.
//!
//! A rule matches facts of one record type against a conjunction of field
//! conditions and, when it fires, starts a process with the matched fact bound
//! to a process variable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::values::{Record, VariableValue};
use crate::error::Diagnostic;

// ── Document shape ──

#[derive(Debug, Clone, Deserialize)]
pub struct RulesDocument {
    pub package: String,
    #[serde(default)]
    pub rules: Vec<RuleDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleDocument {
    pub name: String,
    #[serde(default)]
    pub salience: i32,
    pub when: WhenDocument,
    pub then: ThenDocument,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhenDocument {
    pub fact_type: String,
    #[serde(default)]
    pub conditions: Vec<ConditionDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionDocument {
    pub field: String,
    pub op: String,
    pub value: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThenDocument {
    pub start_process: String,
    pub bind_as: String,
}

// ── Compiled rules ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    /// Apply the operator. Values that cannot be compared never match, except
    /// under `!=`.
    pub fn evaluate(&self, left: &VariableValue, right: &VariableValue) -> bool {
        use std::cmp::Ordering::*;

        match (self, left.compare(right)) {
            (Self::Eq, Some(Equal)) => true,
            (Self::Ne, ordering) => ordering != Some(Equal),
            (Self::Gt, Some(Greater)) => true,
            (Self::Ge, Some(Greater | Equal)) => true,
            (Self::Lt, Some(Less)) => true,
            (Self::Le, Some(Less | Equal)) => true,
            _ => false,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            other => Err(format!("unknown operator '{other}'")),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: VariableValue,
}

impl Condition {
    /// A missing field never matches
    pub fn matches(&self, fact: &Record) -> bool {
        fact.get(&self.field)
            .is_some_and(|actual| self.op.evaluate(actual, &self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub package: String,
    pub name: String,
    pub salience: i32,
    pub fact_type: String,
    pub conditions: Vec<Condition>,
    pub start_process: String,
    pub bind_as: String,
    /// Resource the rule was declared in
    #[serde(skip)]
    pub resource: String,
    /// Position of the rule within its resource
    #[serde(skip)]
    pub position: usize,
}

impl Rule {
    /// `package.name`, unique within a knowledge base
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn matches(&self, fact: &Record) -> bool {
        fact.type_name == self.fact_type && self.conditions.iter().all(|c| c.matches(fact))
    }
}

/// Parse and validate one rules document. Cross references to processes are
/// checked by the knowledge builder.
pub fn compile_rules(
    resource: &str,
    content: &str,
) -> std::result::Result<Vec<Rule>, Vec<Diagnostic>> {
    let document: RulesDocument = serde_yaml::from_str(content).map_err(|e| {
        vec![Diagnostic::new(resource, format!("invalid rules document: {e}"))]
    })?;

    let mut diagnostics = Vec::new();
    if document.package.trim().is_empty() {
        diagnostics.push(Diagnostic::new(resource, "rules package must not be empty"));
    }

    let mut names = BTreeSet::new();
    let mut rules = Vec::new();
    for (position, rule) in document.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                resource,
                format!("rule #{} has an empty name", position + 1),
            ));
        } else if !names.insert(rule.name.as_str()) {
            diagnostics.push(Diagnostic::new(
                resource,
                format!("rule '{}' is declared more than once", rule.name),
            ));
        }

        if rule.when.fact_type.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                resource,
                format!("rule '{}': fact_type must not be empty", rule.name),
            ));
        }
        if rule.then.bind_as.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                resource,
                format!("rule '{}': bind_as must not be empty", rule.name),
            ));
        }

        let mut conditions = Vec::new();
        for condition in &rule.when.conditions {
            let op = match condition.op.parse::<Operator>() {
                Ok(op) => op,
                Err(message) => {
                    diagnostics.push(Diagnostic::new(
                        resource,
                        format!("rule '{}': {}", rule.name, message),
                    ));
                    continue;
                }
            };
            let Some(value) = VariableValue::from_yaml(&condition.value) else {
                diagnostics.push(Diagnostic::new(
                    resource,
                    format!(
                        "rule '{}': condition on '{}' has a value that is not a literal",
                        rule.name, condition.field
                    ),
                ));
                continue;
            };
            conditions.push(Condition {
                field: condition.field.clone(),
                op,
                value,
            });
        }

        rules.push(Rule {
            package: document.package.clone(),
            name: rule.name.clone(),
            salience: rule.salience,
            fact_type: rule.when.fact_type.clone(),
            conditions,
            start_process: rule.then.start_process.clone(),
            bind_as: rule.then.bind_as.clone(),
            resource: resource.to_string(),
            position,
        });
    }

    if diagnostics.is_empty() {
        Ok(rules)
    } else {
        Err(diagnostics)
    }
}
