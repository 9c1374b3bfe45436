//! Streaming transport: per-session outbound queues delivered over SSE

pub mod session;
pub mod sse;

pub use session::SessionTable;
pub use sse::{delete_session, post_message, sse_handler, MESSAGES_PATH};
