// MCP (Model Context Protocol) server implementation
// Exposes the `search` and `fetch` record tools to agent clients

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use dispatcher::{Dispatcher, Invocation};
pub use error::ToolError;
pub use server::McpServer;
