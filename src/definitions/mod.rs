//! # Definitions
//!
//! The small YAML definition language sessions execute: process documents
//! (start, task and end nodes joined by flows) and rule documents that start
//! processes for matching facts. Both compile into a shared
//! [`KnowledgeBase`].
//!
//! ```rust
//! use process_sessions::definitions::{DefinitionResource, KnowledgeBuilder, ResourceType};
//!
//! let process = r#"
//! id: greet
//! nodes:
//!   - { kind: start, id: start }
//!   - { kind: task, id: wait, task_type: Human Task }
//!   - { kind: end, id: end }
//! flows:
//!   - { from: start, to: wait }
//!   - { from: wait, to: end }
//! "#;
//!
//! let kbase = KnowledgeBuilder::new()
//!     .add(DefinitionResource::new("greet.yaml", ResourceType::Process, process))
//!     .build()
//!     .unwrap();
//! assert!(kbase.process("greet").is_some());
//! ```

pub mod knowledge_base;
pub mod process;
pub mod rules;
pub mod values;

pub use knowledge_base::{
    DefinitionResource, KnowledgeBase, KnowledgeBaseTable, KnowledgeBuilder, ResourceType,
};
pub use process::{Node, ProcessDefinition, TaskNode, VariableDeclaration};
pub use rules::{Condition, Operator, Rule};
pub use values::{Record, VariableKind, VariableValue, Variables};
