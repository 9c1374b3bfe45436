use crate::config::AppState;
use crate::transport::MESSAGES_PATH;
use axum::{extract::State, response::Html};
use std::fmt::Write;
use std::sync::Arc;

/// Human-readable landing page
pub async fn serve_root(State(state): State<Arc<AppState>>) -> Html<String> {
    let info = state.mcp.server_info();
    let records = match state.record_count().await {
        Some(count) => count.to_string(),
        None => "unavailable".to_string(),
    };

    let mut tools = String::new();
    for tool in state.mcp.registry().list() {
        let _ = writeln!(
            tools,
            "      <li><code>{}</code>: {}</li>",
            escape(&tool.name),
            escape(&tool.description)
        );
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>{name}</title>
  </head>
  <body>
    <h1>{name} {version}</h1>
    <p>MCP connector exposing a user directory to AI agents.</p>
    <h2>Endpoints</h2>
    <ul>
      <li><code>GET /sse</code>: open an MCP event stream</li>
      <li><code>POST {messages}?session_id=&lt;id&gt;</code>: send a JSON-RPC message on a stream</li>
      <li><code>POST /</code>: one-shot JSON-RPC request</li>
      <li><code>GET /tools</code>: tool descriptors</li>
      <li><code>GET /health</code>: liveness</li>
    </ul>
    <h2>Tools</h2>
    <ul>
{tools}    </ul>
    <p>Records: {records}</p>
    <p>{sessions} active session(s)</p>
  </body>
</html>
"#,
        name = escape(&info.name),
        version = escape(&info.version),
        messages = MESSAGES_PATH,
        tools = tools,
        records = records,
        sessions = state.sessions.len(),
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
