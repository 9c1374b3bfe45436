//! MCP over Server-Sent Events.
//!
//! `GET /sse` opens a session and streams its outbound queue. The first frame
//! is an `endpoint` event naming the side channel, `POST
//! /messages?session_id=<id>`, on which the client sends JSON-RPC messages.
//! Responses are pushed back on the stream, correlated by JSON-RPC id.

use super::session::{OutboundEvent, SessionId, SessionState, StreamSession, TransportError};
use crate::api::{ApiError, ApiResult};
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use dossier_mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use dossier_mcp::McpServer;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;

pub const MESSAGES_PATH: &str = "/messages";

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// Open a new stream session
pub async fn sse_handler(State(state): State<Arc<AppState>>) -> Response {
    match open_stream(&state) {
        Ok((_, stream)) => (
            [
                (header::CACHE_CONTROL, "no-cache"),
                (header::HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Sse::new(stream),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Register a session, queue its handshake and start its heartbeat.
///
/// Returns the session and the SSE event stream draining its queue. Dropping
/// the stream (client disconnect) closes the session.
pub fn open_stream(
    state: &AppState,
) -> ApiResult<(
    Arc<StreamSession>,
    impl Stream<Item = Result<Event, Infallible>> + Send + 'static,
)> {
    let (session, receiver) = state.sessions.open(state.stream.queue_capacity);

    if let Err(e) = handshake(&state.mcp, &session) {
        state.sessions.close(&session.id(), "handshake failed");
        return Err(ApiError::unavailable(format!("Failed to open session: {}", e)));
    }
    if let Err(e) = session.transition(SessionState::Active) {
        state.sessions.close(&session.id(), "handshake failed");
        return Err(ApiError::unavailable(e.to_string()));
    }

    tokio::spawn(monitor_session(
        state.clone(),
        session.clone(),
        state.stream.heartbeat_interval(),
        state.stream.idle_timeout(),
    ));

    let mut writer = SessionWriter {
        session: session.clone(),
        next_seq: 0,
    };
    let stream = ReceiverStream::new(receiver)
        .take_until(session.cancel_token().clone().cancelled_owned())
        .map(move |event| Ok::<Event, Infallible>(writer.frame(event)));

    Ok((session, stream))
}

fn handshake(
    mcp: &McpServer,
    session: &StreamSession,
) -> Result<(), TransportError> {
    session.emit(OutboundEvent::endpoint(format!(
        "{}?session_id={}",
        MESSAGES_PATH,
        session.id()
    )))?;

    let info = JsonRpcRequest::notification(
        "notifications/message",
        serde_json::json!({
            "level": "info",
            "logger": dossier_mcp::server::SERVER_NAME,
            "data": {
                "type": "connection",
                "sessionId": session.id().to_string(),
                "protocolVersion": dossier_mcp::protocol::LATEST_PROTOCOL_VERSION,
                "serverInfo": mcp.server_info(),
                "capabilities": mcp.capabilities(),
                "tools": mcp.registry().names(),
            }
        }),
    );
    session.emit(OutboundEvent::notification(&info))
}

/// Frames queued events in order; the stream holding it is the session's
/// only writer. Dropped when the client goes away.
struct SessionWriter {
    session: Arc<StreamSession>,
    next_seq: u64,
}

impl SessionWriter {
    fn frame(&mut self, event: OutboundEvent) -> Event {
        self.next_seq += 1;
        Event::default()
            .event(event.kind.as_str())
            .id(self.next_seq.to_string())
            .data(event.data())
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        self.session.close("stream dropped");
    }
}

/// Heartbeat and idle watchdog for one session; removes it from the table
/// once it closes for any reason
async fn monitor_session(
    state: AppState,
    session: Arc<StreamSession>,
    heartbeat: Duration,
    idle_timeout: Option<Duration>,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = session.cancel_token().cancelled() => break,
            _ = ticker.tick() => {
                if let Some(limit) = idle_timeout {
                    if session.idle_for() >= limit {
                        session.close("idle timeout");
                        break;
                    }
                }
                if let Err(e) = session.emit(OutboundEvent::heartbeat(session.id())) {
                    tracing::info!(session_id = %session.id(), "Heartbeat failed: {}", e);
                    break;
                }
            }
        }
    }

    state.sessions.close(&session.id(), "session ended");
}

/// Inbound JSON-RPC message for a session
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let session = lookup_session(&state, &query)?;
    session.touch();

    // Invalid UTF-8 counts as malformed too
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(session_id = %session.id(), "Malformed inbound message: {}", e);
            state.sessions.close(&session.id(), "malformed inbound message");
            return Err(ApiError::bad_request(format!("Malformed JSON-RPC message: {}", e)));
        }
    };

    spawn_invocation(state.mcp.clone(), session, request);
    Ok(StatusCode::ACCEPTED)
}

/// Explicit close of a session by its client
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<StatusCode> {
    let session = lookup_session(&state, &query)?;
    state.sessions.close(&session.id(), "closed by client");
    Ok(StatusCode::NO_CONTENT)
}

fn lookup_session(state: &AppState, query: &SessionQuery) -> ApiResult<Arc<StreamSession>> {
    let session = SessionId::parse(&query.session_id)
        .and_then(|id| state.sessions.get(&id))
        .ok_or_else(|| ApiError::not_found(format!("Session not found: {}", query.session_id)))?;

    if session.state() != SessionState::Active {
        return Err(ApiError::not_found(format!("Session closed: {}", query.session_id)));
    }
    Ok(session)
}

/// Handle a request in its own task and push the response onto the session.
///
/// If the session closes first the request is abandoned and nothing is
/// emitted for it.
pub fn spawn_invocation(
    mcp: Arc<McpServer>,
    session: Arc<StreamSession>,
    request: JsonRpcRequest,
) -> tokio::task::JoinHandle<()> {
    let token = session.cancel_token().clone();
    tokio::spawn(async move {
        let method = request.method.clone();
        let response: Option<JsonRpcResponse> = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(
                    session_id = %session.id(),
                    "Abandoning {} for closed session",
                    method
                );
                return;
            }
            response = mcp.handle(request) => response,
        };

        if let Some(response) = response {
            if let Err(e) = session.emit(OutboundEvent::response(&response)) {
                tracing::debug!(
                    session_id = %session.id(),
                    "Discarding {} response: {}",
                    method,
                    e
                );
            }
        }
    })
}
