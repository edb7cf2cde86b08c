//! Connection handlers for the relay server.
//!
//! This module handles the connection lifecycle: upgrade, the per-connection
//! read loop, draining the outbound queue, and cleanup on disconnect.

use crate::config::{Config, CorsConfig};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use relay_core::{ConnectionId, Dispatch, Outboxes, Registry, Router as SignalRouter};
use relay_protocol::codec;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The signaling router.
    pub router: SignalRouter,
    /// Per-connection outbound queues.
    pub outboxes: Arc<Outboxes>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let outboxes = Arc::new(Outboxes::with_capacity(config.transport.outbound_queue));
        let router = SignalRouter::new(Arc::new(Registry::new()), outboxes.clone());

        Self {
            router,
            outboxes,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve the relay on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route(&websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the cross-origin layer.
///
/// With no usable origins configured, falls back to permissive CORS
/// without credentials.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allowed: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    if allowed.is_empty() {
        if !config.allowed_origins.is_empty() {
            warn!("No valid CORS origins configured, falling back to permissive CORS");
        }
        return CorsLayer::permissive();
    }

    info!(origins = ?allowed, "Configured CORS allowed origins");
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut outbox = state.outboxes.open(connection_id.clone());

    loop {
        tokio::select! {
            biased;

            // Envelopes relayed from room peers
            Some(envelope) = outbox.recv() => {
                match codec::encode(&envelope) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            connection = %connection_id,
                            error = %e,
                            "Failed to encode envelope"
                        );
                        metrics::record_error("encode");
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&state, &connection_id, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Accept JSON in binary frames too
                        handle_message(&state, &connection_id, &data).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup runs exactly once, whatever ended the loop.
    state.router.disconnect(&connection_id);
    state.outboxes.close(&connection_id);
    metrics::set_active_rooms(state.router.registry().stats().room_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and dispatch one inbound message.
async fn handle_message(state: &AppState, connection_id: &ConnectionId, data: &[u8]) {
    let dispatch = state.router.handle_frame(connection_id, data).await;
    metrics::record_dispatch(&dispatch);

    if let Dispatch::Joined { .. } = dispatch {
        metrics::set_active_rooms(state.router.registry().stats().room_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::{
        connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
    };

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            metrics: MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            },
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&state)));
        (addr, state)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        client
    }

    async fn send(client: &mut Client, value: Value) {
        client
            .send(WsMessage::Text(value.to_string()))
            .await
            .unwrap();
    }

    async fn recv(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("timed out waiting for a relayed message")
                .expect("stream ended")
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn assert_silent(client: &mut Client) {
        let next = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
        assert!(next.is_err(), "unexpected message: {next:?}");
    }

    async fn wait_for_members(state: &AppState, room: &str, count: usize) {
        for _ in 0..200 {
            if state.router.registry().members(room).len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {count} members");
    }

    async fn http_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response.to_lowercase()
    }

    fn join(room: &str) -> Value {
        json!({"event": "join", "data": {"roomId": room}})
    }

    #[tokio::test]
    async fn test_relays_to_other_room_members() {
        let (addr, state) = spawn_server().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;
        let mut c = connect(addr).await;

        for client in [&mut a, &mut b, &mut c] {
            send(client, join("r1")).await;
        }
        wait_for_members(&state, "r1", 3).await;

        send(
            &mut a,
            json!({"event": "localDescription", "data": {"description": "sdpA"}}),
        )
        .await;

        let expected = json!({"event": "localDescription", "data": {"description": "sdpA"}});
        assert_eq!(recv(&mut b).await, expected);
        assert_eq!(recv(&mut c).await, expected);
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn test_separate_rooms_do_not_hear_each_other() {
        let (addr, state) = spawn_server().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;

        send(&mut a, join("r1")).await;
        send(&mut b, join("r2")).await;
        wait_for_members(&state, "r1", 1).await;
        wait_for_members(&state, "r2", 1).await;

        send(
            &mut a,
            json!({"event": "iceCandidate", "data": {"candidate": "cand"}}),
        )
        .await;

        assert_silent(&mut b).await;
    }

    #[tokio::test]
    async fn test_malformed_messages_keep_connection_open() {
        let (addr, state) = spawn_server().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;

        a.send(WsMessage::Text("not json".to_string())).await.unwrap();
        send(&mut a, json!({"data": {"roomId": "r1"}})).await;
        send(&mut a, json!({"event": 5, "data": {}})).await;
        send(&mut a, json!({"event": "iceCandidate", "data": {}})).await;
        send(&mut a, json!({"event": "hangUp", "data": {}})).await;

        send(&mut a, join("r1")).await;
        send(&mut b, join("r1")).await;
        wait_for_members(&state, "r1", 2).await;

        send(
            &mut a,
            json!({"event": "iceCandidate", "data": {"candidate": "cand"}}),
        )
        .await;
        assert_eq!(
            recv(&mut b).await,
            json!({"event": "iceCandidate", "data": {"candidate": "cand"}})
        );
    }

    #[tokio::test]
    async fn test_large_description_is_relayed() {
        let (addr, state) = spawn_server().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;

        send(&mut a, join("r1")).await;
        send(&mut b, join("r1")).await;
        wait_for_members(&state, "r1", 2).await;

        let description = "v".repeat(100 * 1024);
        send(
            &mut a,
            json!({"event": "localDescription", "data": {"description": description}}),
        )
        .await;

        assert_eq!(
            recv(&mut b).await,
            json!({"event": "localDescription", "data": {"description": description}})
        );
        assert_eq!(state.router.registry().members("r1").len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_removes_membership() {
        let (addr, state) = spawn_server().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;

        send(&mut a, join("r1")).await;
        send(&mut b, join("r1")).await;
        wait_for_members(&state, "r1", 2).await;

        a.close(None).await.unwrap();
        wait_for_members(&state, "r1", 1).await;

        send(
            &mut b,
            json!({"event": "iceCandidateReply", "data": {"candidate": "cand"}}),
        )
        .await;
        send(&mut b, json!({"event": "hangUp"})).await;
        assert_silent(&mut b).await;

        assert_eq!(state.router.registry().stats().connection_count, 1);
        assert_eq!(state.outboxes.len(), 1);

        b.close(None).await.unwrap();
        wait_for_members(&state, "r1", 0).await;
        assert!(!state.router.registry().room_exists("r1"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, _state) = spawn_server().await;

        let response = http_request(
            addr,
            "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(response.starts_with("http/1.1 200"));
        assert!(response.contains(r#""status":"ok""#));
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let (addr, _state) = spawn_server().await;

        let response = http_request(
            addr,
            "OPTIONS /ws HTTP/1.1\r\nHost: localhost\r\nOrigin: http://localhost:5173\r\n\
             Access-Control-Request-Method: GET\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(response.contains("access-control-allow-origin: http://localhost:5173"));
        assert!(response.contains("access-control-allow-credentials: true"));
    }
}
