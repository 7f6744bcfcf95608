//! Model tool call dispatch
//!
//! Turns a raw `{id, name, arguments}` call into a [`ToolInvocation`]. Lookup
//! failures, malformed arguments, handler errors and handler panics all end up
//! as text the model can read; dispatch itself never fails.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use super::registry::ToolRegistry;
use crate::Error;
use crate::llm::ToolCall;

/// Why a dispatched call did not produce a normal result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl From<DispatchError> for Error {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownTool(name) => Self::UnknownTool(name),
            DispatchError::InvalidArguments(msg) => Self::InvalidArguments(msg),
            DispatchError::Execution(msg) => Self::ToolExecution(msg),
        }
    }
}

/// Outcome of one dispatched call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub raw_arguments: String,
    /// `None` when the argument text was not valid JSON
    pub arguments: Option<Value>,
    /// Text fed back to the model
    pub result: String,
    pub error: Option<DispatchError>,
}

impl ToolInvocation {
    /// Whether the handler ran and succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(call: &ToolCall, arguments: Option<Value>, error: DispatchError) -> Self {
        tracing::warn!(tool = %call.name, call_id = %call.id, error = %error, "tool call failed");
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            raw_arguments: call.arguments.clone(),
            arguments,
            result: format!("Error: {error}"),
            error: Some(error),
        }
    }
}

/// Executes model tool calls against a registry
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    /// Create a dispatcher over `registry`
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry calls are resolved against
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Look up, parse and run one call
    pub async fn dispatch(&self, call: &ToolCall) -> ToolInvocation {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolInvocation::failed(call, None, DispatchError::UnknownTool(call.name.clone()));
        };

        let arguments = match parse_arguments(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                return ToolInvocation::failed(call, None, DispatchError::InvalidArguments(e));
            }
        };

        tracing::info!(tool = %call.name, call_id = %call.id, "dispatching tool call");

        let outcome = AssertUnwindSafe(tool.handler.call(arguments.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(tool = %call.name, result_len = result.len(), "tool call succeeded");
                ToolInvocation {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    raw_arguments: call.arguments.clone(),
                    arguments: Some(arguments),
                    result,
                    error: None,
                }
            }
            Ok(Err(Error::InvalidArguments(msg))) => {
                ToolInvocation::failed(call, Some(arguments), DispatchError::InvalidArguments(msg))
            }
            Ok(Err(e)) => {
                ToolInvocation::failed(call, Some(arguments), DispatchError::Execution(e.to_string()))
            }
            Err(panic) => ToolInvocation::failed(
                call,
                Some(arguments),
                DispatchError::Execution(format!("handler panicked: {}", panic_message(&*panic))),
            ),
        }
    }
}

/// Parse argument text, treating blank text as an empty object
fn parse_arguments(raw: &str) -> std::result::Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::Result;
    use crate::tools::{ToolDefinition, ToolHandler, ToolSpec};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: Value) -> Result<String> {
            Ok(format!("echo {args}"))
        }
    }

    struct Fails;

    #[async_trait]
    impl ToolHandler for Fails {
        async fn call(&self, _args: Value) -> Result<String> {
            Err(Error::Host("disk full".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        async fn call(&self, _args: Value) -> Result<String> {
            panic!("boom");
        }
    }

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(ToolRegistry::new([
            ToolDefinition::new(ToolSpec::new("Echo", "echo"), Arc::new(Echo)),
            ToolDefinition::new(ToolSpec::new("Fails", "fails"), Arc::new(Fails)),
            ToolDefinition::new(ToolSpec::new("Panics", "panics"), Arc::new(Panics)),
        ])))
    }

    #[tokio::test]
    async fn runs_registered_tool() {
        let inv = dispatcher()
            .dispatch(&ToolCall::new("c1", "Echo", r#"{"a":1}"#))
            .await;
        assert!(inv.is_success());
        assert_eq!(inv.result, r#"echo {"a":1}"#);
        assert_eq!(inv.call_id, "c1");
    }

    #[tokio::test]
    async fn blank_arguments_are_empty_object() {
        let inv = dispatcher().dispatch(&ToolCall::new("c1", "Echo", "  ")).await;
        assert_eq!(inv.result, "echo {}");
    }

    #[tokio::test]
    async fn unknown_tool() {
        let inv = dispatcher().dispatch(&ToolCall::new("c1", "Nope", "{}")).await;
        assert_eq!(inv.error, Some(DispatchError::UnknownTool("Nope".to_string())));
        assert!(inv.result.starts_with("Error: unknown tool"));
    }

    #[tokio::test]
    async fn malformed_arguments() {
        let inv = dispatcher().dispatch(&ToolCall::new("c1", "Echo", "{not json")).await;
        assert!(matches!(inv.error, Some(DispatchError::InvalidArguments(_))));
        assert!(inv.arguments.is_none());
    }

    #[tokio::test]
    async fn handler_error_becomes_text() {
        let inv = dispatcher().dispatch(&ToolCall::new("c1", "Fails", "{}")).await;
        assert!(matches!(inv.error, Some(DispatchError::Execution(_))));
        assert!(inv.result.contains("disk full"));
    }

    #[tokio::test]
    async fn handler_panic_is_captured() {
        let inv = dispatcher().dispatch(&ToolCall::new("c1", "Panics", "{}")).await;
        assert!(matches!(inv.error, Some(DispatchError::Execution(_))));
        assert!(inv.result.contains("boom"));
    }
}
