//! HTTP and WebSocket front door.
//!
//! Every route hands raw bytes to the [`Gateway`] and writes back whatever it
//! produces. The router itself never inspects JSON-RPC payloads.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use gateway_core::{
    config::AppConfig,
    proxy::{Gateway, GatewayResponse},
    upstream::Upstream,
};
use serde_json::json;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::debug;

const JSON_CONTENT_TYPE: &str = "application/json";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Builds the application router with its security layers.
///
/// `/metrics` is only mounted when metrics are enabled in `config`.
pub fn create_app(gateway: Gateway, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .route("/", post(handle_rpc))
        .route("/ws", get(handle_ws))
        .route("/health", get(handle_health));

    if config.metrics.enabled {
        app = app.route("/metrics", get(handle_metrics));
    }

    app.with_state(gateway)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(CorsLayer::permissive())
}

/// Handles one JSON-RPC call over plain HTTP.
///
/// Upstream bytes are returned with `200`; a gateway failure is returned as the
/// error envelope with `500`.
pub async fn handle_rpc(State(gateway): State<Gateway>, body: Bytes) -> Response {
    let (status, body) = match gateway.respond(body).await {
        GatewayResponse::Success(body) => (StatusCode::OK, body),
        GatewayResponse::Failure(body) => (StatusCode::INTERNAL_SERVER_ERROR, body),
    };

    (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}

/// Upgrades to a WebSocket carrying one JSON-RPC call per frame.
pub async fn handle_ws(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(gateway, socket))
}

/// Answers frames strictly in arrival order until the client goes away.
async fn serve_socket(gateway: Gateway, mut socket: WebSocket) {
    while let Some(message) = socket.recv().await {
        let (raw, binary) = match message {
            Ok(Message::Text(text)) => (Bytes::copy_from_slice(text.as_str().as_bytes()), false),
            Ok(Message::Binary(data)) => (data, true),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "websocket client error");
                break;
            }
        };

        let reply = reply_frame(gateway.respond(raw).await.into_body(), binary);
        if let Err(e) = socket.send(reply).await {
            debug!(error = %e, "failed to write websocket reply");
            break;
        }
    }
}

/// Answers in the frame type the request arrived in.
fn reply_frame(body: Bytes, binary: bool) -> Message {
    if binary {
        Message::Binary(body)
    } else {
        Message::Text(String::from_utf8_lossy(&body).into_owned().into())
    }
}

pub async fn handle_health(State(gateway): State<Gateway>) -> impl IntoResponse {
    let handle = gateway.config();
    let running = handle.load();

    let upstreams: Vec<_> = running
        .upstreams()
        .iter()
        .map(|upstream| match upstream {
            Upstream::Http(http) => json!({
                "url": http.url(),
                "transport": "http",
                "archival_url": http.archival_url(),
                "block_height": http.block_height(),
            }),
            Upstream::Stream(stream) => json!({
                "url": stream.url(),
                "transport": "stream",
                "connected": stream.is_connected(),
            }),
        })
        .collect();

    Json(json!({
        "status": "ok",
        "strategy": running.strategy().kind().to_string(),
        "method_limitation_enabled": running.method_limitation_enabled(),
        "upstreams": upstreams,
        "requests": handle.metrics().summary(),
    }))
}

pub async fn handle_metrics(State(gateway): State<Gateway>) -> impl IntoResponse {
    let metrics_text = gateway.config().metrics().get_prometheus_metrics();

    (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics_text)
}
