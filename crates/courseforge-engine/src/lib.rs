//! Courseforge Orchestration Engine
//!
//! The hard core of the system: the in-memory [`Store`] (single source of
//! truth for runs, tasks, events, and feedback), the bounded-concurrency
//! [`TaskQueue`], the [`Orchestrator`] workflow state machine, and the
//! agent-handler contract the stage implementations plug into.
//!
//! Store and queue are explicit injectable instances; nothing in this
//! crate is a module-level singleton.

pub mod handler;
pub mod orchestrator;
pub mod queue;
pub mod redact;
pub mod sanitize;
pub mod store;

pub use handler::{AgentHandler, AgentRegistry, HandlerError, NoopHandler};
pub use orchestrator::{Orchestrator, WorkflowError};
pub use queue::{QueueState, TaskQueue, DEFAULT_CONCURRENCY};
pub use store::Store;
