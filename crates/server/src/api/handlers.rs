use crate::config::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dossier_mcp::protocol::{ToolSchema, LATEST_PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Liveness check
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let server_info = state.mcp.server_info();
    Json(HealthResponse {
        status: "ok".to_string(),
        service: server_info.name.clone(),
        version: server_info.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_sessions: state.sessions.len(),
        records: state.record_count().await,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    /// Null when the record store is unavailable
    pub records: Option<usize>,
}

/// List the registered tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ListToolsResponse> {
    let server_info = state.mcp.server_info();
    Json(ListToolsResponse {
        tools: state.mcp.registry().list(),
        server_info: ServerInfoView {
            name: server_info.name.clone(),
            version: server_info.version.clone(),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        },
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolSchema>,
    pub server_info: ServerInfoView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfoView {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

/// Plain request/response JSON-RPC, without a stream session
pub async fn rpc(State(state): State<Arc<AppState>>, body: String) -> Response {
    match state.mcp.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
