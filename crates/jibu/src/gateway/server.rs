//! HTTP gateway server
//!
//! Implements the streaming chat endpoint:
//! - Pre-stream phases (authentication, body parsing) answer with ordinary
//!   status-coded JSON, since the status line can still be changed.
//! - Once the event stream opens, every failure is reported in-band as a
//!   single `error` event and the transport is closed.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::Response,
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::{ChatConfig, Config};
use crate::error::{GatewayError, Result};

use super::history::{ChatMessage, normalize_messages, stitch};
use super::provider::ProviderSelection;
use super::providers::{ChatBackend, HostedBackend, LocalBackend};
use super::streaming::{EventKind, OutboundEvent, encode_event};

/// Bound on in-flight encoded frames; the adapter read loop pauses when the
/// consumer stops draining.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Payload of the one `info` event emitted on automatic fallback
const FALLBACK_NOTICE: &str = "Local backend unavailable, falling back to hosted.";

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Chat defaults (provider selection, system directive)
    pub chat: ChatConfig,
    /// Session authenticator backed by the identity service
    pub authenticator: Authenticator,
    /// Local newline-delimited-JSON backend
    pub local: LocalBackend,
    /// Hosted SSE backend
    pub hosted: HostedBackend,
}

/// The main gateway server
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the gateway and listen for requests.
    ///
    /// Secrets are resolved from the environment exactly once here; request
    /// handling never reads the environment.
    pub async fn serve(&self) -> Result<()> {
        validate_config(&self.config)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.server.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Server(format!("Failed to create HTTP client: {e}")))?;

        let anon_key = std::env::var(&self.config.auth.anon_key_env).ok();
        if anon_key.is_none() {
            tracing::warn!(
                "identity anon key env var '{}' is not set; chat requests will fail with 500",
                self.config.auth.anon_key_env
            );
        }
        let hosted_key = std::env::var(&self.config.hosted.api_key_env).ok();
        if hosted_key.is_none() {
            tracing::info!(
                "hosted API key env var '{}' is not set; hosted backend disabled",
                self.config.hosted.api_key_env
            );
        }

        let app_state = Arc::new(AppState {
            chat: self.config.chat.clone(),
            authenticator: Authenticator::new(
                client.clone(),
                self.config.auth.identity_url.clone(),
                anon_key,
            ),
            local: LocalBackend::new(
                client.clone(),
                self.config.local.base_url.clone(),
                self.config.local.model.clone(),
            ),
            hosted: HostedBackend::new(
                client,
                self.config.hosted.api_url.clone(),
                self.config.hosted.model.clone(),
                self.config.hosted.temperature,
                hosted_key,
            ),
        });

        let app = create_router(app_state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting gateway on {addr}");
        tracing::info!(
            "Default provider: {}, local backend: {}, hosted endpoint: {}",
            self.config.chat.default_provider,
            self.config.local.base_url,
            self.config.hosted.api_url
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Gateway shut down gracefully");
        Ok(())
    }
}

/// Reject unparsable backend URLs at startup instead of per request
fn validate_config(config: &Config) -> Result<()> {
    let urls = [
        ("local.base_url", config.local.base_url.as_str()),
        ("hosted.api_url", config.hosted.api_url.as_str()),
    ];
    for (name, value) in urls {
        Url::parse(value)
            .map_err(|e| GatewayError::Config(format!("Invalid {name} '{value}': {e}")))?;
    }

    if !config.auth.identity_url.trim().is_empty() {
        Url::parse(&config.auth.identity_url).map_err(|e| {
            GatewayError::Config(format!(
                "Invalid auth.identity_url '{}': {e}",
                config.auth.identity_url
            ))
        })?;
    }

    Ok(())
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Expected JSON payload of the chat endpoint
///
/// `messages` entries stay raw values; normalization decides what survives.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default, rename = "systemPrompt")]
    system_prompt: Option<String>,
}

/// Handle a chat request: authenticate, normalize, then stream.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let request_id = Uuid::new_v4();

    let principal = match state.authenticator.verify(&headers).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::debug!(%request_id, "authentication failed: {err}");
            return error_response(&err);
        }
    };

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return error_response(&GatewayError::MalformedRequest(
                "Invalid JSON body.".to_string(),
            ));
        }
    };

    let history = normalize_messages(&request.messages);
    let directive = request
        .system_prompt
        .as_deref()
        .filter(|prompt| !prompt.trim().is_empty())
        .unwrap_or(&state.chat.system_prompt);
    let stitched = stitch(directive, &history);
    let selection =
        ProviderSelection::from_request(request.provider.as_deref(), state.chat.default_provider);

    tracing::debug!(
        %request_id,
        principal = %principal,
        provider = %selection,
        turns = history.len(),
        "opening chat stream"
    );

    let (tx, rx) = mpsc::channel::<Bytes>(EVENT_CHANNEL_CAPACITY);
    let span = tracing::info_span!("chat_stream", %request_id, provider = %selection);
    tokio::spawn(run_stream(state, selection, stitched, tx).instrument(span));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        })
}

/// Writes encoded frames to the response channel.
///
/// A failed send means the client went away; no further writes are
/// attempted once that is observed.
struct EventSink {
    tx: mpsc::Sender<Bytes>,
}

/// The client disconnected; the transport is gone.
struct ClientGone;

impl EventSink {
    fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    async fn send(&self, kind: EventKind, payload: &str) -> std::result::Result<(), ClientGone> {
        let frame = encode_event(&OutboundEvent::new(kind, payload));
        self.tx
            .send(Bytes::from(frame))
            .await
            .map_err(|_| ClientGone)
    }
}

/// How one backend attempt ended
enum StreamOutcome {
    /// Adapter returned normally after its terminal marker
    Completed,
    /// Failed before any token was forwarded; `auto` may still fall back
    FailedBeforeContent(GatewayError),
    /// Failed after content was forwarded; fallback is no longer possible
    FailedMidStream(GatewayError),
    /// Client disconnected; stop everything silently
    Disconnected,
}

/// Drive the event stream for one request.
///
/// Emits exactly one `open` first, then token/info events in production
/// order, then a single terminal `done` or `error`. Dropping the sender
/// closes the transport, which is the consumer's authoritative
/// end-of-stream signal even if no terminal event was written.
async fn run_stream(
    state: Arc<AppState>,
    selection: ProviderSelection,
    stitched: Vec<ChatMessage>,
    tx: mpsc::Sender<Bytes>,
) {
    let sink = EventSink::new(tx);

    // Immediately acknowledge stream open to help the client UI.
    if sink.send(EventKind::Open, "ok").await.is_err() {
        return;
    }

    let outcome = match selection {
        ProviderSelection::Local => stream_backend(&state.local, &stitched, &sink).await,
        ProviderSelection::Hosted => stream_backend(&state.hosted, &stitched, &sink).await,
        ProviderSelection::Auto => {
            match stream_backend(&state.local, &stitched, &sink).await {
                StreamOutcome::FailedBeforeContent(err) => {
                    tracing::warn!("local backend failed before content, falling back: {err}");
                    if sink.send(EventKind::Info, FALLBACK_NOTICE).await.is_err() {
                        return;
                    }
                    stream_backend(&state.hosted, &stitched, &sink).await
                }
                outcome => outcome,
            }
        }
    };

    match outcome {
        StreamOutcome::Completed => {
            let _ = sink.send(EventKind::Done, "ok").await;
        }
        StreamOutcome::FailedBeforeContent(err) | StreamOutcome::FailedMidStream(err) => {
            tracing::warn!("chat stream failed: {err}");
            let _ = sink.send(EventKind::Error, &err.to_string()).await;
        }
        StreamOutcome::Disconnected => {
            tracing::debug!("client disconnected mid-stream");
        }
    }
}

/// Run one backend attempt, forwarding tokens in production order.
async fn stream_backend(
    backend: &dyn ChatBackend,
    messages: &[ChatMessage],
    sink: &EventSink,
) -> StreamOutcome {
    let mut stream = match backend.open_stream(messages).await {
        Ok(stream) => stream,
        Err(err) => return StreamOutcome::FailedBeforeContent(err),
    };

    let mut produced_content = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(token) => {
                if sink.send(EventKind::Token, &token).await.is_err() {
                    return StreamOutcome::Disconnected;
                }
                produced_content = true;
            }
            Err(err) => {
                return if produced_content {
                    StreamOutcome::FailedMidStream(err)
                } else {
                    StreamOutcome::FailedBeforeContent(err)
                };
            }
        }
    }

    StreamOutcome::Completed
}

/// Status code for a pre-stream failure
fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing message for a pre-stream failure
fn client_message(error: &GatewayError) -> String {
    match error {
        GatewayError::Unauthenticated(msg)
        | GatewayError::MisconfiguredService(msg)
        | GatewayError::MalformedRequest(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Map a pre-stream failure to a status-coded JSON response
fn error_response(error: &GatewayError) -> Response<Body> {
    create_error_response(status_for(error), &client_message(error))
}

/// Create a JSON error response
fn create_error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
