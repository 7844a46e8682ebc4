//! WebSocket server for the sales relay

use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tower_http::trace::TraceLayer;

use super::orchestrator::Relay;
use super::session::SessionConnection;
use crate::error::{RelayError, Result};
use crate::types::CloseStatus;
use crate::upstream::UpstreamTransport;

/// Path clients connect to
pub const WS_PATH: &str = "/ws/ventas";

/// Allow-list for the `Origin` header of upgrade requests
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    patterns: Vec<String>,
}

impl OriginPolicy {
    /// `*` in a pattern matches any run of characters. No patterns allows everything.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.trim().is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        // Browsers always send Origin; other clients are not cross-site requests.
        let Some(origin) = origin else {
            return true;
        };
        self.patterns
            .iter()
            .any(|pattern| wildcard_match(pattern, origin))
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Write half of an axum WebSocket
pub struct WsConnection {
    sink: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(sink),
        }
    }
}

#[async_trait]
impl SessionConnection for WsConnection {
    async fn send_text(&self, text: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| RelayError::Delivery(e.to_string()))
    }

    async fn close(&self, status: CloseStatus) -> Result<()> {
        let frame = CloseFrame {
            code: status.code(),
            reason: Cow::Borrowed(status.reason()),
        };
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| RelayError::Delivery(e.to_string()))
    }
}

/// WebSocket + health server
pub struct RelayServer<T: UpstreamTransport> {
    relay: Relay<T>,
    origins: OriginPolicy,
    addr: SocketAddr,
}

impl<T: UpstreamTransport> RelayServer<T> {
    pub fn new(relay: Relay<T>, origins: OriginPolicy, addr: SocketAddr) -> Self {
        Self {
            relay,
            origins,
            addr,
        }
    }

    /// Build the router
    pub fn router(relay: Relay<T>, origins: OriginPolicy) -> Router {
        let ws = Router::new()
            .route(WS_PATH, get(ws_handler::<T>))
            .route_layer(middleware::from_fn_with_state(
                Arc::new(origins),
                check_origin,
            ));

        Router::new()
            .merge(ws)
            .route("/health", get(health_handler::<T>))
            .layer(TraceLayer::new_for_http())
            .with_state(relay)
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(self.relay, self.origins);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("WebSocket server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Reject upgrades from origins outside the allow-list
async fn check_origin(
    State(origins): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !origins.allows(origin) {
        tracing::warn!(origin = ?origin, "Rejected WebSocket upgrade from disallowed origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    next.run(request).await
}

/// Health check endpoint
async fn health_handler<T: UpstreamTransport>(State(relay): State<Relay<T>>) -> Response {
    let health = relay.health();
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

/// WebSocket upgrade handler
async fn ws_handler<T: UpstreamTransport>(
    ws: WebSocketUpgrade,
    State(relay): State<Relay<T>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

/// Handle an individual WebSocket connection
async fn handle_socket<T: UpstreamTransport>(socket: WebSocket, relay: Relay<T>) {
    let (sender, mut receiver) = socket.split();
    let connection = Arc::new(WsConnection::new(sender));

    // On setup failure the relay has already closed the socket; we only
    // drain until the client acknowledges.
    let session_id = relay.on_connect(connection).await.ok();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(id) = &session_id {
                    relay.on_message(id, &text);
                }
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!(
                    session_id = ?session_id,
                    frame = ?frame,
                    "Client closed connection"
                );
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    session_id = ?session_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
        }
    }

    if let Some(id) = session_id {
        relay.on_disconnect(&id);
    }
}
