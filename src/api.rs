//! HTTP surface: history reads over REST and the live WebSocket stream.
//!
//! - `GET /health` - liveness probe
//! - `GET /api/sensors?limit=N` - the N most recent readings, newest first
//! - `GET /ws` - live push stream, one JSON reading per ingest event

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::registry::ObserverRegistry;
use crate::store::{ReadingStore, StoreError};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ReadingStore>,
    pub registry: Arc<ObserverRegistry>,
}

/// Error body shape the portal already expects.
#[derive(serde::Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /api/sensors - recent readings, newest first.
async fn list_recent(
    State(state): State<ApiState>,
    Query(query): Query<RecentQuery>,
) -> Response {
    match state.store.recent(query.limit).await {
        Ok(readings) => (StatusCode::OK, Json(readings)).into_response(),
        Err(e @ StoreError::InvalidLimit(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                detail: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                detail: format!("failed to query readings: {e}"),
            }),
        )
            .into_response(),
    }
}

/// GET /ws - upgrade to the live reading stream.
async fn ws_handler(State(state): State<ApiState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| observer_session(socket, state.registry))
}

/// One observer's lifetime: register, pump the outbound queue into the
/// socket, ignore inbound frames (liveness only), unregister on any exit.
async fn observer_session(socket: WebSocket, registry: Arc<ObserverRegistry>) {
    let (id, mut outbound) = registry.register().await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // queue closed: evicted by a failed broadcast sweep
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    registry.unregister(id).await;
    info!(observer = id, "websocket session ended");
}

pub fn create_router(state: ApiState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable allowed origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sensors", get(list_recent))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}
