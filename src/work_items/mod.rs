//! # Work Items
//!
//! Units of external work a process instance waits on, the handler contract
//! used to announce them, and the per-session registry and manager that route
//! them.

pub mod handler;
pub mod indexing_handler;
pub mod manager;
pub mod registry;
pub mod work_item;

pub use handler::{ExternalTaskHandler, HandlerContext};
pub use indexing_handler::IndexingTaskHandler;
pub use manager::WorkItemManager;
pub use registry::WorkItemHandlerRegistry;
pub use work_item::{WorkItem, WorkItemCompletion};
