//! Stream sessions and the table of active sessions.
//!
//! Each session owns a bounded outbound queue. Producers (tool invocations,
//! the heartbeat task) push with `try_send`; the SSE response body is the
//! queue's only consumer, so frames are written by a single writer.

use dossier_mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Opening, Active) | (Opening, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    /// Whether outbound events may still be queued
    pub fn accepts_events(self) -> bool {
        matches!(self, SessionState::Opening | SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Opening => "opening",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session is closing or closed; the event was discarded.
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    /// The client stopped reading; the session has been closed.
    #[error("Client of session {0} is unreachable")]
    WriteFailure(SessionId),

    /// The outbound queue overflowed; the session has been closed.
    #[error("Outbound queue of session {0} is full")]
    QueueFull(SessionId),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// SSE event names used on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Handshake: URI of the inbound message channel
    Endpoint,
    /// A JSON-RPC response or notification
    Message,
    Heartbeat,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Endpoint => "endpoint",
            EventKind::Message => "message",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Text(String),
    Json(Value),
}

/// One frame waiting in a session's outbound queue
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub kind: EventKind,
    /// Request id this event answers, if any
    pub correlation_id: Option<Value>,
    pub payload: EventPayload,
}

impl OutboundEvent {
    pub fn endpoint(uri: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Endpoint,
            correlation_id: None,
            payload: EventPayload::Text(uri.into()),
        }
    }

    pub fn response(response: &JsonRpcResponse) -> Self {
        Self {
            kind: EventKind::Message,
            correlation_id: Some(response.id.clone()),
            payload: EventPayload::Json(json_or_null(response)),
        }
    }

    pub fn notification(notification: &JsonRpcRequest) -> Self {
        Self {
            kind: EventKind::Message,
            correlation_id: None,
            payload: EventPayload::Json(json_or_null(notification)),
        }
    }

    pub fn heartbeat(session_id: SessionId) -> Self {
        Self {
            kind: EventKind::Heartbeat,
            correlation_id: None,
            payload: EventPayload::Json(serde_json::json!({
                "type": "heartbeat",
                "status": "alive",
                "session_id": session_id.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        }
    }

    /// Text carried in the frame's `data` field
    pub fn data(&self) -> String {
        match &self.payload {
            EventPayload::Text(text) => text.clone(),
            EventPayload::Json(value) => value.to_string(),
        }
    }
}

fn json_or_null<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize outbound event: {}", e);
        Value::Null
    })
}

/// One connected client
pub struct StreamSession {
    id: SessionId,
    state: Mutex<SessionState>,
    outbound: mpsc::Sender<OutboundEvent>,
    cancel: CancellationToken,
    last_activity: Mutex<Instant>,
}

impl StreamSession {
    /// Create a session in `Opening` together with its queue's receiving end
    pub fn new(id: SessionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<OutboundEvent>) {
        let (outbound, receiver) = mpsc::channel(capacity);
        let session = Arc::new(Self {
            id,
            state: Mutex::new(SessionState::Opening),
            outbound,
            cancel: CancellationToken::new(),
            last_activity: Mutex::new(Instant::now()),
        });
        (session, receiver)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Fires when the session starts closing; in-flight work watches this
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn transition(&self, next: SessionState) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            return Err(TransportError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        let from = *state;
        tracing::debug!(session_id = %self.id, from = %from, to = %next, "Session transition");
        *state = next;
        Ok(())
    }

    /// Queue an event for the client.
    ///
    /// A full queue or a vanished client closes the session.
    pub fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        if !self.state().accepts_events() {
            return Err(TransportError::SessionClosed(self.id));
        }

        match self.outbound.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.close("outbound queue full");
                Err(TransportError::QueueFull(self.id))
            }
            Err(TrySendError::Closed(_)) => {
                self.close("client unreachable");
                Err(TransportError::WriteFailure(self.id))
            }
        }
    }

    /// Record inbound traffic for idle tracking
    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    /// Close the session, abandoning in-flight invocations. Idempotent.
    pub fn close(&self, reason: &str) {
        {
            let mut state = lock(&self.state);
            if !state.accepts_events() {
                return;
            }
            let from = *state;
            tracing::info!(session_id = %self.id, from = %from, "Closing session: {}", reason);
            *state = SessionState::Closing;
        }

        self.cancel.cancel();

        let mut state = lock(&self.state);
        *state = SessionState::Closed;
        tracing::debug!(session_id = %self.id, "Session closed");
    }
}

/// Active sessions keyed by id; mutated only on open and close
#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<StreamSession>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in `Opening`
    pub fn open(&self, capacity: usize) -> (Arc<StreamSession>, mpsc::Receiver<OutboundEvent>) {
        let (session, receiver) = StreamSession::new(SessionId::new(), capacity);
        lock(&self.sessions).insert(session.id(), session.clone());
        tracing::info!(session_id = %session.id(), "Session opened");
        (session, receiver)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<StreamSession>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Close a session and drop it from the table
    pub fn close(&self, id: &SessionId, reason: &str) -> bool {
        let removed = lock(&self.sessions).remove(id);
        match removed {
            Some(session) => {
                session.close(reason);
                true
            }
            None => false,
        }
    }

    /// Close every session, e.g. on server shutdown
    pub fn close_all(&self, reason: &str) {
        let sessions: Vec<_> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close(reason);
        }
        if !sessions.is_empty() {
            tracing::info!("Closed {} session(s): {}", sessions.len(), reason);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
