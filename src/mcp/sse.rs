//! Server-sent events transport.
//!
//! `GET /sse` opens a session and announces its POST endpoint in an `endpoint` event.
//! Messages posted to `/messages?sessionId=<id>` are answered with `202 Accepted`; their
//! JSON-RPC responses are pushed to the session stream as `message` events.

use super::McpServer;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Json, Response, Sse,
    },
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared state for the SSE router
pub struct SseState {
    pub server: McpServer,
    sessions: DashMap<String, mpsc::UnboundedSender<Value>>,
}

impl SseState {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: DashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every session sender, which ends the open event streams.
    pub fn close_sessions(&self) {
        let open = self.sessions.len();
        self.sessions.clear();
        if open > 0 {
            info!(sessions = open, "Closed SSE sessions");
        }
    }
}

/// Removes its session when the event stream is dropped (client gone or server closing).
struct SessionGuard {
    state: Arc<SseState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions.remove(&self.session_id);
        info!(session_id = %self.session_id, "SSE session closed");
    }
}

#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

enum SseError {
    BadRequest(String),
    SessionNotFound(String),
}

impl IntoResponse for SseError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            SseError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            SseError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Session not found: {}", id))
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Create SSE router with session, message and health endpoints
pub fn create_router(state: Arc<SseState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/sse", get(open_session))
        .route("/messages", post(post_message))
        .route("/health", get(health))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated origin list.
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if cors_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// GET /sse - Open a session stream
async fn open_session(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    state.sessions.insert(session_id.clone(), tx);
    info!(session_id = %session_id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={}", session_id));
    let guard = SessionGuard {
        state: Arc::clone(&state),
        session_id,
    };

    let messages = UnboundedReceiverStream::new(rx).map(move |message| {
        let _session = &guard;
        Ok(Event::default().event("message").data(message.to_string()))
    });

    Sse::new(tokio_stream::once(Ok(endpoint)).chain(messages)).keep_alive(KeepAlive::default())
}

/// POST /messages?sessionId= - Accept a JSON-RPC message for a session
async fn post_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<StatusCode, SseError> {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return Err(SseError::BadRequest("Missing sessionId".to_string()));
    };
    let sender = state
        .sessions
        .get(&session_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| SseError::SessionNotFound(session_id.clone()))?;

    let message: Value = serde_json::from_slice(&body)
        .map_err(|e| SseError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let server = state.server.clone();
    tokio::spawn(async move {
        if let Some(response) = server.handle_message(message).await {
            if sender.send(response).is_err() {
                debug!(session_id = %session_id, "Session closed before response was delivered");
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Serves the SSE transport until Ctrl-C or SIGTERM.
pub async fn run(server: McpServer, host: &str, port: u16, cors_origin: &str) -> Result<()> {
    let state = Arc::new(SseState::new(server));
    let router = create_router(Arc::clone(&state), cors_origin);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    info!(host = %host, port = port, "MCP server listening on SSE (GET /sse, POST /messages)");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            state.close_sessions();
        })
        .await
        .context("SSE server error")?;

    info!("SSE server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl_c signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
