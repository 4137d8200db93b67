//! HTTP and WebSocket gateway
//!
//! Exposes:
//! - `POST /notify` and `POST /pai`
//! - `GET /health`
//! - `GET /` and `/index.html` (web client)
//! - `GET /ws` (realtime event stream)
//!
//! Every response carries permissive CORS headers. Everything except the
//! web client, the WebSocket upgrade and preflight requests counts against
//! the caller's rate limit, including `/health` and unknown paths.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::{ChannelClient, RealtimeBroadcaster, CLIENT_QUEUE_CAPACITY};
use crate::config::{Config, ServerConfig};
use crate::dispatch::{NotificationDispatcher, NotificationRequest};
use crate::error::{DispatchError, RelayError, ValidationError};
use crate::notification::DesktopNotifier;
use crate::playback::LocalAudioPlayer;
use crate::rate_limit::RateLimiter;

const NOTIFY_DEFAULT_TITLE: &str = "PAI Notification";
const PAI_DEFAULT_TITLE: &str = "PAI Assistant";
const DEFAULT_MESSAGE: &str = "Task completed";

const FALLBACK_TEXT: &str = "PAIVoice Server - POST to /notify or /pai";

const PLACEHOLDER_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>PAI Voice Server</title>
</head>
<body>
  <h1>PAI Voice Server</h1>
  <p>Web interface not yet installed. Please create public/index.html</p>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<NotificationDispatcher>,
    rate_limiter: Arc<RateLimiter>,
    public_dir: Option<PathBuf>,
    port: u16,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    port: u16,
    voice_system: &'static str,
    model: String,
    default_voice_id: String,
    api_key_configured: bool,
    clients: usize,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn rate_limited() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded".to_string(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusResponse {
            status: "error",
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Running gateway handle.
pub struct ServiceHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ServiceHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Service task join error: {}", e);
        }
    }
}

/// Build every component from `config` and start serving.
pub async fn start(config: &Config) -> Result<ServiceHandle, RelayError> {
    let synthesizer = crate::tts::create_synthesizer(&config.provider);
    let broadcaster = Arc::new(RealtimeBroadcaster::new());
    let notifier = Arc::new(DesktopNotifier::new(&config.notifier));
    let player = config
        .playback
        .enabled
        .then(|| Arc::new(LocalAudioPlayer::new(&config.playback)));

    let dispatcher = Arc::new(NotificationDispatcher::new(
        synthesizer,
        broadcaster,
        notifier,
        player,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

    start_with(config.server.clone(), dispatcher, rate_limiter).await
}

/// Start serving with caller-supplied components.
pub async fn start_with(
    server_cfg: ServerConfig,
    dispatcher: Arc<NotificationDispatcher>,
    rate_limiter: Arc<RateLimiter>,
) -> Result<ServiceHandle, RelayError> {
    let bind_addr = format!("{}:{}", server_cfg.host, server_cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| RelayError::Server(format!("Failed to bind {}: {}", bind_addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| RelayError::Server(format!("Failed to read local address: {}", e)))?;

    let state = AppState {
        dispatcher,
        rate_limiter,
        public_dir: server_cfg.public_dir,
        port: local_addr.port(),
    };

    let app = build_router(state, server_cfg.max_body_bytes);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        {
            tracing::error!("HTTP server failed: {}", e);
        }
    });

    Ok(ServiceHandle {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/notify", post(notify_handler))
        .route("/pai", post(pai_handler))
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/ws", get(ws_handler))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Answers preflight requests and stamps CORS headers on every response
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if matches!(request.uri().path(), "/" | "/index.html" | "/ws") {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let origin = origin_key(request.headers(), peer);

    if !state.rate_limiter.allow(&origin) {
        tracing::warn!("Rate limit exceeded for {}", origin);
        return ApiError::rate_limited().into_response();
    }

    next.run(request).await
}

/// First `X-Forwarded-For` entry, else the peer IP, else "localhost"
fn origin_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Parse a request body as a JSON object; an empty body means "all defaults"
fn parse_body(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

/// A string field, `None` when absent, null or empty
fn string_field<'a>(
    body: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, DispatchError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(DispatchError::Invalid {
            field,
            source: ValidationError::InvalidType,
        }),
    }
}

fn notify_request(body: &Map<String, Value>) -> Result<NotificationRequest, DispatchError> {
    let title = string_field(body, "title")?.unwrap_or(NOTIFY_DEFAULT_TITLE);
    let message = string_field(body, "message")?.unwrap_or(DEFAULT_MESSAGE);
    let voice_enabled = !matches!(body.get("voice_enabled"), Some(Value::Bool(false)));

    let voice_id = voice_override(body)?;

    Ok(NotificationRequest {
        title: title.to_string(),
        message: message.to_string(),
        voice_enabled,
        voice_id,
    })
}

/// `voice_id`, else `voice_name`; any string is accepted as-is
fn voice_override(body: &Map<String, Value>) -> Result<Option<String>, DispatchError> {
    for key in ["voice_id", "voice_name"] {
        let voice = string_field(body, key).map_err(|_| DispatchError::Invalid {
            field: "voice_id",
            source: ValidationError::InvalidType,
        })?;
        if let Some(voice) = voice {
            return Ok(Some(voice.to_string()));
        }
    }
    Ok(None)
}

fn pai_request(body: &Map<String, Value>) -> Result<NotificationRequest, DispatchError> {
    Ok(NotificationRequest {
        title: string_field(body, "title")?
            .unwrap_or(PAI_DEFAULT_TITLE)
            .to_string(),
        message: string_field(body, "message")?
            .unwrap_or(DEFAULT_MESSAGE)
            .to_string(),
        voice_enabled: true,
        voice_id: None,
    })
}

/// Run a dispatch on its own task so a dropped connection cannot cancel it
async fn run_dispatch(state: &AppState, request: NotificationRequest) -> Result<(), ApiError> {
    tracing::info!(
        "Notification: \"{}\" - \"{}\" (voice: {}, voice_id: {})",
        request.title,
        request.message,
        request.voice_enabled,
        request
            .voice_id
            .as_deref()
            .unwrap_or_else(|| state.dispatcher.synthesizer().default_voice_id())
    );

    let dispatcher = state.dispatcher.clone();
    match tokio::spawn(async move { dispatcher.dispatch(request).await }).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            tracing::warn!("Rejected notification: {}", e);
            Err(e.into())
        }
        Err(e) => {
            tracing::error!("Dispatch task failed: {}", e);
            Err(ApiError::internal())
        }
    }
}

fn success(message: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "success",
        message: message.to_string(),
    })
}

async fn notify_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let body = parse_body(&body)?;
    let request = notify_request(&body)?;
    run_dispatch(&state, request).await?;
    Ok(success("Notification sent"))
}

async fn pai_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let body = parse_body(&body)?;
    let request = pai_request(&body)?;
    run_dispatch(&state, request).await?;
    Ok(success("PAI notification sent"))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let synthesizer = state.dispatcher.synthesizer();
    Json(HealthResponse {
        status: "healthy",
        port: state.port,
        voice_system: "ElevenLabs",
        model: synthesizer.model().to_string(),
        default_voice_id: synthesizer.default_voice_id().to_string(),
        api_key_configured: synthesizer.is_configured(),
        clients: state.dispatcher.broadcaster().client_count(),
    })
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    if let Some(dir) = &state.public_dir {
        let path = dir.join("index.html");
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => return Html(html),
            Err(e) => tracing::debug!("No web client at {:?}: {}", path, e),
        }
    }
    Html(PLACEHOLDER_HTML.to_string())
}

async fn fallback_handler() -> &'static str {
    FALLBACK_TEXT
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let broadcaster = state.dispatcher.broadcaster().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<RealtimeBroadcaster>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(CLIENT_QUEUE_CAPACITY);
    let id = broadcaster.register(Arc::new(ChannelClient::new(tx)));

    // Writer ends when the broadcaster drops this client or the socket fails
    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    tracing::debug!("WebSocket message from client {}: {}", id, text)
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("WebSocket error from client {}: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    broadcaster.unregister(id);
}
