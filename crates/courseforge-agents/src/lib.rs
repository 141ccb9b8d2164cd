//! Courseforge Stage Agents
//!
//! One handler per pipeline stage, each following the same three-way
//! contract: simulation mode returns canned fixture data; live mode
//! calls Gemini and normalizes its JSON; any model-layer problem falls
//! back to the fixtures instead of failing the task. This is what keeps
//! runs alive through a completely absent or misbehaving model.

pub mod error;
pub mod fixtures;
pub mod gemini;
pub mod normalize;
pub mod stages;

pub use error::AgentError;
pub use gemini::GeminiClient;
pub use stages::{build_registry, StageContext};
