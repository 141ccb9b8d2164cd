//! The agent-handler contract and registry.
//!
//! Each pipeline stage plugs in one [`AgentHandler`]; the queue resolves
//! handlers by [`AgentKind`] and falls back to the registry's default for
//! anything unregistered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use courseforge_core::{AgentKind, Task};

/// Error returned by an agent handler.
///
/// Model-layer problems never surface here - handlers absorb them into
/// their simulation fallback. A handler error therefore means the stage
/// itself is broken, and fails the task.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not produce a result.
    #[error("{0}")]
    Failed(String),
}

/// One pipeline stage's logic: a function of a task to an opaque result.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Execute the stage for the given task.
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError>;
}

/// Fallback handler used when a task names an unregistered stage.
///
/// Returns an empty result rather than failing, so a stray task degrades
/// to a no-op instead of failing its run.
pub struct NoopHandler;

#[async_trait]
impl AgentHandler for NoopHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        Ok(json!({
            "source": "noop",
            "agent": task.agent.as_str(),
        }))
    }
}

/// Lookup table from stage to handler.
///
/// A default handler is always present: [`AgentRegistry::new`] seeds the
/// [`AgentKind::Default`] slot with [`NoopHandler`], and [`resolve`]
/// falls back to it for unregistered stages.
///
/// [`resolve`]: AgentRegistry::resolve
pub struct AgentRegistry {
    handlers: HashMap<AgentKind, Arc<dyn AgentHandler>>,
}

impl AgentRegistry {
    /// Create a registry with the no-op default handler installed.
    pub fn new() -> Self {
        let mut handlers: HashMap<AgentKind, Arc<dyn AgentHandler>> = HashMap::new();
        handlers.insert(AgentKind::Default, Arc::new(NoopHandler));
        Self { handlers }
    }

    /// Register (or replace) the handler for a stage.
    pub fn register(&mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Resolve the handler for a stage, falling back to the default.
    ///
    /// `None` only if even the default slot is empty, which the
    /// constructor prevents.
    pub fn resolve(&self, kind: AgentKind) -> Option<Arc<dyn AgentHandler>> {
        self.handlers
            .get(&kind)
            .or_else(|| self.handlers.get(&AgentKind::Default))
            .cloned()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseforge_core::RunId;

    struct EchoHandler;

    #[async_trait]
    impl AgentHandler for EchoHandler {
        async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
            Ok(json!({"echo": task.description}))
        }
    }

    #[tokio::test]
    async fn test_resolve_registered_handler() {
        let registry =
            AgentRegistry::new().with_handler(AgentKind::Discovery, Arc::new(EchoHandler));
        let handler = registry.resolve(AgentKind::Discovery).unwrap();
        let task = Task::new(RunId::generate(), AgentKind::Discovery, "hello");
        let result = handler.handle(&task).await.unwrap();
        assert_eq!(result["echo"], "hello");
    }

    #[tokio::test]
    async fn test_unregistered_stage_falls_back_to_noop() {
        let registry = AgentRegistry::new();
        let handler = registry.resolve(AgentKind::Validation).unwrap();
        let task = Task::new(RunId::generate(), AgentKind::Validation, "check");
        let result = handler.handle(&task).await.unwrap();
        assert_eq!(result["source"], "noop");
        assert_eq!(result["agent"], "validation");
    }
}
