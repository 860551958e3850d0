//! HTTP Server Implementation
//!
//! Serves the chat API and the embeddable web widget:
//!
//! ```text
//!  browser widget ──┐
//!  curl / backend ──┼──► axum Router ──► ChatService ──► AgentClient
//!                   │        │
//!                   │        └──► sessions (DashMap<session id, ChatSession>)
//! ```
//!
//! # Routes
//!
//! - `POST /chat`: `{prompt, session_id?, end_session?}` -> `{session_id, response, metadata}`
//! - `GET /health`: liveness check
//! - `GET /debug-env`: agent coordinates, only when enabled in config
//! - `GET /widget.js`: embeddable chat widget
//! - `GET /sessions/:id`, `DELETE /sessions/:id`: turn history of a session
//! - `GET /static/*`: files from the configured static directory
//!
//! Errors are returned as `{"detail": "<message>"}`. Agent and decode
//! failures are reported with a generic message; details go to the log.
//!
//! # Caller Identity
//!
//! Rate limiting keys on the peer address. `X-Forwarded-For` is only honoured
//! when `server.trust_forwarded_for` is set, since any caller can write it.
//!
//! # Maintenance
//!
//! A background task runs once per rate-limit window. It drops expired
//! limiter windows and evicts sessions idle for `server.session_idle_secs`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use gateway_core::request_log::{JsonLinesRequestLog, RequestLog, TracingRequestLog};
use gateway_core::session::now_ms;
use gateway_core::{
    AgentClient, AgentConfig, ChatError, ChatRequest, ChatService, ChatSession, ChatTurn,
    CitationRecord, GatewayConfig, RateLimitError, ServerConfig, SessionId, SessionState,
};

/// Widget markup served at `/widget.js`
const WIDGET: &str = include_str!("../assets/widget.html");

/// Detail returned for agent and decode failures
const GENERIC_FAILURE: &str = "Failed to process the request";

// =============================================================================
// State
// =============================================================================

/// State shared by all handlers
pub struct AppState {
    /// The chat pipeline
    pub service: ChatService,
    /// Turn history per session
    pub sessions: DashMap<String, ChatSession>,
    /// Agent coordinates reported by `/debug-env`
    pub agent: AgentConfig,
    /// Whether `X-Forwarded-For` identifies the caller
    pub trust_forwarded_for: bool,
    /// Idle time after which a session is evicted
    pub session_idle: Duration,
}

impl AppState {
    /// Create state with an empty session table
    pub fn new(service: ChatService, agent: AgentConfig, server: &ServerConfig) -> Self {
        Self {
            service,
            sessions: DashMap::new(),
            agent,
            trust_forwarded_for: server.trust_forwarded_for,
            session_idle: Duration::from_secs(server.session_idle_secs),
        }
    }

    /// Caller identity for rate limiting and logs
    fn client(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
        client_identity(headers, peer, self.trust_forwarded_for)
    }

    /// Drop expired limiter windows and idle sessions
    ///
    /// Returns the number of sessions evicted.
    pub fn sweep(&self, now: Instant, now_ms: u64) -> usize {
        self.service.limiter().purge_expired(now);

        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_idle(now_ms, self.session_idle));
        let evicted = before.saturating_sub(self.sessions.len());

        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.sessions.len(),
                tracked_clients = self.service.limiter().tracked_clients(),
                "Evicted idle sessions"
            );
        }
        evicted
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// `POST /chat` body
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// The question; missing and blank are both rejected
    #[serde(default)]
    pub prompt: String,
    /// Session to continue
    #[serde(default)]
    pub session_id: Option<String>,
    /// Close the session after answering
    #[serde(default)]
    pub end_session: bool,
}

/// `POST /chat` reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Session the answer belongs to
    pub session_id: String,
    /// Cleaned answer text
    pub response: String,
    /// Citations the agent used
    pub metadata: Vec<CitationRecord>,
}

/// `GET /sessions/:id` reply
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    /// Session identifier
    pub session_id: String,
    /// Whether the session is still active
    pub state: SessionState,
    /// Turns, newest first
    pub turns: Vec<ChatTurn>,
}

// =============================================================================
// Errors
// =============================================================================

/// Error rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            retry_after_secs: None,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after_secs = match &err {
            ChatError::RateLimited(RateLimitError::RateLimitExceeded {
                retry_after_secs, ..
            }) => Some(*retry_after_secs),
            _ => None,
        };
        let detail = if err.is_client_error() {
            err.to_string()
        } else {
            GENERIC_FAILURE.to_string()
        };

        Self {
            status,
            detail,
            retry_after_secs,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the router for `state`
pub fn router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/widget.js", get(widget))
        .route("/sessions/:id", get(session_history).delete(end_session));

    if server.debug_env {
        warn!("/debug-env is enabled");
        router = router.route("/debug-env", get(debug_env));
    }

    if let Some(ref dir) = server.static_dir {
        info!(path = %dir.display(), "Serving static files under /static");
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Caller identity: the peer address, or the first `X-Forwarded-For` entry
/// when the header is trusted
fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    trust_forwarded_for
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

async fn chat(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let client = state.client(&headers, connect.map(|ConnectInfo(addr)| addr));
    let question = body.prompt.trim().to_string();
    let end = body.end_session;

    let mut request = ChatRequest::new(body.prompt).with_end_session(end);
    if let Some(id) = body.session_id {
        request = request.with_session_id(id);
    }
    if let Some(client) = client {
        request = request.with_client(client);
    }

    let reply = state.service.ask(request).await?;

    {
        let mut session = state
            .sessions
            .entry(reply.session_id.clone())
            .or_insert_with(|| ChatSession::with_id(SessionId::from(reply.session_id.as_str())));
        if let Err(e) = session.record_turn(question, reply.answer.as_str(), reply.trace.as_str()) {
            warn!(session_id = %reply.session_id, error = %e, "Turn not recorded");
        }
    }
    if end {
        if let Some((_, mut session)) = state.sessions.remove(&reply.session_id) {
            session.end();
        }
    }

    Ok(Json(ChatResponse {
        session_id: reply.session_id,
        response: reply.answer,
        metadata: reply.citations,
    }))
}

async fn health(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let client = state.client(&headers, connect.map(|ConnectInfo(addr)| addr));
    state.service.record_health_check(client.as_deref());
    Json(json!({ "status": "ok" }))
}

async fn debug_env(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "AWS_REGION": state.agent.region,
        "AGENT_ID": state.agent.agent_id,
        "AGENT_ALIAS_ID": state.agent.agent_alias_id,
    }))
}

async fn widget() -> Html<&'static str> {
    Html(WIDGET)
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Session not found"))?;

    Ok(Json(SessionView {
        session_id: session.id().to_string(),
        state: session.state(),
        turns: session.newest_first().cloned().collect(),
    }))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (_, mut session) = state
        .sessions
        .remove(&id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Session not found"))?;
    session.end();
    info!(session_id = %id, "Session ended by client");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Serving
// =============================================================================

/// Run [`AppState::sweep`] every `period` until aborted
fn spawn_maintenance(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state.sweep(Instant::now(), now_ms());
        }
    })
}

/// Run the HTTP server until SIGINT or SIGTERM
pub async fn serve(config: GatewayConfig, client: Arc<dyn AgentClient>) -> Result<()> {
    let json_log = match config.server.request_log {
        Some(ref path) => Some(Arc::new(
            JsonLinesRequestLog::open(path)
                .await
                .with_context(|| format!("Failed to open request log: {}", path.display()))?,
        )),
        None => None,
    };
    let log: Arc<dyn RequestLog> = match json_log {
        Some(ref log) => log.clone(),
        None => Arc::new(TracingRequestLog),
    };

    let service = ChatService::from_config(&config, client, log);
    let state = Arc::new(AppState::new(service, config.agent.clone(), &config.server));
    let app = router(state.clone(), &config.server);
    let maintenance = spawn_maintenance(
        state.clone(),
        Duration::from_secs(config.rate_limit.window_secs.max(1)),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        address = %config.server.bind,
        agent = state.service.client_name(),
        rate_limit = config.rate_limit.enabled,
        trust_forwarded_for = config.server.trust_forwarded_for,
        "HTTP server listening"
    );

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed");

    maintenance.abort();
    let _ = maintenance.await;
    drop(state);
    if let Some(log) = json_log {
        match Arc::try_unwrap(log) {
            Ok(log) => log.shutdown().await,
            Err(_) => warn!("Request log still in use, pending entries may be lost"),
        }
    }

    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

// =============================================================================
// Tests
// =============================================================================
