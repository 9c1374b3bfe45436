use crate::config::{AppState, ServerConfig};
use crate::transport::{self, SessionTable};
use crate::ui;
use anyhow::Result;
use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;
    let sessions = state.sessions.clone();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after closing every open session, so that their
/// streams end and axum can drain
async fn shutdown_signal(sessions: SessionTable) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    tracing::info!("Shutdown requested");
    if !sessions.is_empty() {
        tracing::info!("Closing {} active sessions", sessions.len());
        sessions.close_all("server shutdown");
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Diagnostics
        .route("/", get(ui::serve_root).post(handlers::rpc))
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        // Stream transport
        .route("/sse", get(transport::sse_handler))
        .route("/sse/", get(transport::sse_handler))
        .route(
            transport::MESSAGES_PATH,
            post(transport::post_message).delete(transport::delete_session),
        )
        .fallback(route_not_found)
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: anyhow::anyhow!(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_msg = self.error.to_string();
        let details = self
            .error
            .chain()
            .skip(1)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ");

        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{:#}", self.error);
        }

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (self.status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, BodyDataStream};
    use axum::http::{header, Request};
    use dossier_core::storage::{InMemoryRecordStore, RecordStore};
    use dossier_core::{RecordId, UserRecord};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        state_with_heartbeat(3600)
    }

    fn state_with_heartbeat(heartbeat_secs: u64) -> AppState {
        let mut config = ServerConfig::default();
        config.stream.heartbeat_secs = heartbeat_secs;
        let store = Arc::new(InMemoryRecordStore::with_records(vec![
            UserRecord::new("1", "Alice Wong", "alice@example.com"),
            UserRecord::new("2", "Bob Smith", "bob@example.com"),
        ]));
        AppState::with_store(&config, store)
    }

    struct OfflineStore;

    #[async_trait::async_trait]
    impl RecordStore for OfflineStore {
        async fn find(&self, _query: &str) -> anyhow::Result<Vec<UserRecord>> {
            anyhow::bail!("connection refused")
        }

        async fn get(&self, _id: &RecordId) -> anyhow::Result<Option<UserRecord>> {
            anyhow::bail!("connection refused")
        }

        async fn count(&self) -> anyhow::Result<usize> {
            anyhow::bail!("connection refused")
        }
    }

    async fn text_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: impl Into<String>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.into()))
            .unwrap()
    }

    fn delete_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn call(id: i64, tool: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": tool, "arguments": arguments}
        })
        .to_string()
    }

    #[derive(Debug)]
    struct Frame {
        event: String,
        id: Option<String>,
        data: String,
    }

    /// Reads SSE frames off a live response body
    struct SseReader {
        body: BodyDataStream,
        buffer: String,
    }

    impl SseReader {
        fn new(response: Response) -> Self {
            Self {
                body: response.into_body().into_data_stream(),
                buffer: String::new(),
            }
        }

        async fn next_frame(&mut self) -> Option<Frame> {
            loop {
                if let Some(pos) = self.buffer.find("\n\n") {
                    let raw: String = self.buffer.drain(..pos + 2).collect();
                    if let Some(frame) = parse_frame(&raw) {
                        return Some(frame);
                    }
                    continue;
                }

                let chunk = tokio::time::timeout(Duration::from_secs(5), self.body.next())
                    .await
                    .expect("timed out waiting for SSE frame")?
                    .unwrap();
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        }

        async fn handshake(&mut self) -> String {
            let endpoint = self.next_frame().await.unwrap();
            assert_eq!(endpoint.event, "endpoint");

            let info = self.next_frame().await.unwrap();
            assert_eq!(info.event, "message");
            let notification: Value = serde_json::from_str(&info.data).unwrap();
            assert_eq!(notification["method"], "notifications/message");

            endpoint.data
        }
    }

    fn parse_frame(raw: &str) -> Option<Frame> {
        let mut event = None;
        let mut id = None;
        let mut data = Vec::new();

        for line in raw.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event = Some(value.to_string()),
                "id" => id = Some(value.to_string()),
                "data" => data.push(value.to_string()),
                _ => {}
            }
        }

        Some(Frame {
            event: event?,
            id,
            data: data.join("\n"),
        })
    }

    async fn open_session(app: &Router) -> (SseReader, String) {
        let response = send(app, get_request("/sse")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let mut reader = SseReader::new(response);
        let endpoint = reader.handshake().await;
        (reader, endpoint)
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let response = send(&app, get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "dossier");
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["records"], 2);
        assert!(body["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_health_survives_store_outage() {
        let state = AppState::with_store(&ServerConfig::default(), Arc::new(OfflineStore));
        let app = create_router(state);

        let response = send(&app, get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["records"].is_null());

        let response = send(&app, get_request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text_body(response).await.contains("Records: unavailable"));
    }

    #[test]
    fn test_api_error_status_and_debug() {
        let error = ApiError::bad_request("bad input");
        assert!(format!("{:?}", error).contains("bad input"));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let error = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_tools_match_tools_list() {
        let app = create_router(test_state());

        let body = json_body(send(&app, get_request("/tools")).await).await;
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["search", "fetch"]);
        assert_eq!(body["server_info"]["name"], "dossier");
        assert!(body["server_info"]["protocol_version"].is_string());

        let rpc = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string();
        let listed = json_body(send(&app, post_request("/", rpc)).await).await;
        assert_eq!(listed["result"]["tools"], body["tools"]);
    }

    #[tokio::test]
    async fn test_root_page() {
        let app = create_router(test_state());
        let response = send(&app, get_request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let html = text_body(response).await;
        assert!(html.contains("/sse"));
        assert!(html.contains("Records: 2"));
        assert!(html.contains("search"));
        assert!(html.contains("fetch"));
    }

    #[tokio::test]
    async fn test_direct_rpc() {
        let app = create_router(test_state());

        let response = send(&app, post_request("/", call(3, "search", json!({"query": "bob"})))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], 3);
        assert_eq!(body["result"]["structuredContent"]["results"][0]["id"], "2");

        let notification =
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        let response = send(&app, post_request("/", notification)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_router(test_state());
        let response = send(&app, get_request("/api/runs")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_sse_search_result() {
        let state = test_state();
        let app = create_router(state.clone());
        let (mut reader, endpoint) = open_session(&app).await;
        assert!(endpoint.starts_with("/messages?session_id="));
        assert_eq!(state.sessions.len(), 1);

        let response = send(&app, post_request(&endpoint, call(42, "search", json!({"query": "Alice"})))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame.event, "message");
        assert_eq!(frame.id.as_deref(), Some("3"));

        let message: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(message["id"], 42);
        assert_eq!(
            message["result"]["structuredContent"],
            json!({"results": [{"id": "1", "title": "Alice Wong", "url": "http://localhost:8000/users/1"}]})
        );
    }

    #[tokio::test]
    async fn test_sse_fetch_not_found() {
        let app = create_router(test_state());
        let (mut reader, endpoint) = open_session(&app).await;

        let response = send(&app, post_request(&endpoint, call(9, "fetch", json!({"id": "999"})))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let frame = reader.next_frame().await.unwrap();
        let message: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(message["id"], 9);
        assert_eq!(message["error"]["data"]["kind"], "NotFound");
        assert!(message.get("result").is_none());
    }

    #[tokio::test]
    async fn test_sse_repeated_fetch_is_stable() {
        let app = create_router(test_state());
        let (mut reader, endpoint) = open_session(&app).await;

        let mut payloads = Vec::new();
        for id in [1, 2] {
            send(&app, post_request(&endpoint, call(id, "fetch", json!({"id": "1"})))).await;
            let frame = reader.next_frame().await.unwrap();
            let message: Value = serde_json::from_str(&frame.data).unwrap();
            assert_eq!(message["id"], id);
            payloads.push(message["result"].clone());
        }
        assert_eq!(payloads[0], payloads[1]);
        assert_eq!(payloads[0]["structuredContent"]["id"], "1");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let app = create_router(test_state());

        let response = send(
            &app,
            post_request(
                "/messages?session_id=00000000000000000000000000000000",
                call(1, "search", json!({"query": "a"})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, post_request("/messages?session_id=nope", "{}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_message_closes_session() {
        let state = test_state();
        let app = create_router(state.clone());
        let (mut reader, endpoint) = open_session(&app).await;

        let response = send(&app, post_request(&endpoint, "{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.sessions.is_empty());

        // The stream ends and the session no longer accepts messages
        assert!(reader.next_frame().await.is_none());
        let response = send(&app, post_request(&endpoint, call(1, "search", json!({"query": "a"})))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_utf8_message_closes_session() {
        let state = test_state();
        let app = create_router(state.clone());
        let (mut reader, endpoint) = open_session(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri(endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(vec![0xff, 0xfe, b'{']))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.sessions.is_empty());
        assert!(reader.next_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_reach_the_stream() {
        let state = state_with_heartbeat(1);
        let app = create_router(state);
        let (mut reader, endpoint) = open_session(&app).await;
        let session_id = endpoint.trim_start_matches("/messages?session_id=");

        for expected_id in ["3", "4"] {
            let frame = reader.next_frame().await.unwrap();
            assert_eq!(frame.event, "heartbeat");
            assert_eq!(frame.id.as_deref(), Some(expected_id));

            let data: Value = serde_json::from_str(&frame.data).unwrap();
            assert_eq!(data["type"], "heartbeat");
            assert_eq!(data["session_id"], session_id);
            assert!(data["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let state = test_state();
        let app = create_router(state.clone());
        let (mut reader, endpoint) = open_session(&app).await;

        let response = send(&app, delete_request(&endpoint)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.sessions.is_empty());
        assert!(reader.next_frame().await.is_none());

        let response = send(&app, delete_request(&endpoint)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let state = test_state();
        let app = create_router(state.clone());
        let (mut first, first_endpoint) = open_session(&app).await;
        let (mut second, second_endpoint) = open_session(&app).await;
        assert_ne!(first_endpoint, second_endpoint);
        assert_eq!(state.sessions.len(), 2);

        send(&app, post_request(&second_endpoint, call(5, "search", json!({"query": "bob"})))).await;
        let frame = second.next_frame().await.unwrap();
        let message: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(message["id"], 5);

        // Closing the first session leaves the second one usable
        send(&app, delete_request(&first_endpoint)).await;
        assert!(first.next_frame().await.is_none());

        send(&app, post_request(&second_endpoint, call(6, "fetch", json!({"id": "2"})))).await;
        let frame = second.next_frame().await.unwrap();
        let message: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(message["id"], 6);
        assert_eq!(message["result"]["structuredContent"]["title"], "Bob Smith");
    }
}
