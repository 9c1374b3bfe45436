//! Errors raised while executing a tool invocation.

use crate::protocol::JsonRpcError;
use serde_json::json;

/// Application-defined JSON-RPC error codes
pub const NOT_FOUND_CODE: i32 = -32001;
pub const UPSTREAM_TIMEOUT_CODE: i32 = -32002;
pub const UPSTREAM_ERROR_CODE: i32 = -32003;

/// Error kinds a tool invocation can end in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not satisfy the tool's input schema.
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// The requested record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record store did not answer in time.
    #[error("Record store timed out")]
    UpstreamTimeout,

    /// The record store failed; details are only logged.
    #[error("Record store unavailable")]
    UpstreamError,
}

impl ToolError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure, logging its details without exposing them
    pub fn upstream(err: &anyhow::Error) -> Self {
        tracing::warn!(error = %format!("{:#}", err), "Record store failure");
        Self::UpstreamError
    }

    /// Stable name of the error kind, as sent to clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownTool",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::NotFound(_) => "NotFound",
            Self::UpstreamTimeout => "UpstreamTimeout",
            Self::UpstreamError => "UpstreamError",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownTool(_) => JsonRpcError::METHOD_NOT_FOUND,
            Self::InvalidInput { .. } => JsonRpcError::INVALID_PARAMS,
            Self::NotFound(_) => NOT_FOUND_CODE,
            Self::UpstreamTimeout => UPSTREAM_TIMEOUT_CODE,
            Self::UpstreamError => UPSTREAM_ERROR_CODE,
        }
    }

    /// JSON-RPC error carrying the kind (and offending field) in `data`
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let data = match self {
            Self::InvalidInput { field, .. } => json!({ "kind": self.kind(), "field": field }),
            _ => json!({ "kind": self.kind() }),
        };
        JsonRpcError::custom(self.code(), self.to_string()).with_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_names_field() {
        let err = ToolError::invalid_input("query", "missing required field");
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, -32602);
        assert_eq!(rpc.data.unwrap(), json!({"kind": "InvalidInput", "field": "query"}));
        assert!(rpc.message.contains("query"));
    }

    #[test]
    fn test_upstream_error_hides_details() {
        let err = ToolError::upstream(&anyhow::anyhow!("connection refused: db.internal:5432"));
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, UPSTREAM_ERROR_CODE);
        assert!(!rpc.message.contains("db.internal"));
        assert_eq!(rpc.data.unwrap()["kind"], "UpstreamError");
    }

    #[test]
    fn test_not_found_kind() {
        let rpc = ToolError::NotFound("999".to_string()).to_rpc_error();
        assert_eq!(rpc.code, NOT_FOUND_CODE);
        assert_eq!(rpc.data.unwrap()["kind"], "NotFound");
    }
}
