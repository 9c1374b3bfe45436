//! Tool invocation dispatch.
//!
//! The dispatcher resolves the tool, validates arguments against its input
//! schema, and runs it under a bounded timeout. The tool itself is the only
//! part of request handling that may suspend.

use crate::error::ToolError;
use crate::tools::{validate_arguments, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A single tool call awaiting execution
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: String,
    pub arguments: Value,
    /// JSON-RPC request id the result is correlated with
    pub correlation_id: Value,
}

impl Invocation {
    pub fn new(tool: impl Into<String>, arguments: Value, correlation_id: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            correlation_id,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute an invocation, consuming it
    pub async fn dispatch(&self, invocation: Invocation) -> Result<Value, ToolError> {
        let Invocation {
            tool: name,
            arguments,
            correlation_id,
        } = invocation;

        let (schema, tool) = self.registry.lookup(&name)?;
        validate_arguments(schema, &arguments)?;

        tracing::debug!(tool = %name, correlation_id = %correlation_id, "Dispatching tool call");

        match tokio::time::timeout(self.timeout, tool.execute(arguments)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tool = %name,
                    correlation_id = %correlation_id,
                    "Tool call exceeded {:?}",
                    self.timeout
                );
                Err(ToolError::UpstreamTimeout)
            }
        }
    }
}
