//! # Sessions
//!
//! Durable process sessions: the serializable state, the store that persists
//! it with optimistic versioning, the runtime that executes process
//! instances, and the [`StatefulSession`] handle tying them together.

pub mod environment;
pub(crate) mod runtime;
pub mod state;
pub mod stateful_session;
pub mod store;

pub use environment::{Environment, EnvironmentBuilder};
pub use state::{Activation, FactHandle, ProcessInstance, SessionState};
pub use stateful_session::StatefulSession;
pub use store::{SessionInfo, SessionStore};
