use std::sync::Arc;

use {
    axum::{
        Router,
        extract::{
            Path, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        http::StatusCode,
        response::{IntoResponse, Json},
        routing::get,
    },
    charla_common::Credentials,
    charla_registry::{CreateOutcome, SessionRegistry},
    charla_store::SessionStore,
    serde::Deserialize,
    tower_http::cors::{Any, CorsLayer},
    tracing::debug,
};

use crate::push::BroadcastEventSink;

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn SessionStore>,
    pub events: Arc<BroadcastEventSink>,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route(
            "/api/sessions/{tenant_id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/{tenant_id}/qr", get(qr_handler))
        .route("/ws", get(ws_upgrade_handler))
        .layer(cors)
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub tenant_id: String,
    pub endpoint_url: String,
    pub endpoint_key: String,
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let credentials = Credentials::new(request.endpoint_url, request.endpoint_key);
    let outcome = state
        .registry
        .create_session(&request.tenant_id, credentials)
        .await;

    let code = match outcome {
        CreateOutcome::Success => StatusCode::CREATED,
        CreateOutcome::AlreadyExists => StatusCode::CONFLICT,
        CreateOutcome::Failed => StatusCode::BAD_GATEWAY,
    };
    (code, Json(serde_json::json!({ "status": outcome })))
}

/// Persisted records carry the message counter; the live registry view wins
/// on status. Sessions whose record write failed still show up, counter-less.
async fn list_sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let records = match state.store.list().await {
        Ok(records) => records,
        Err(e) => {
            debug!(error = %e, "failed to list session records");
            Vec::new()
        },
    };

    let mut seen = std::collections::HashSet::new();
    let mut sessions = Vec::with_capacity(records.len());
    for record in records {
        let status = state
            .registry
            .get_session(&record.tenant_id)
            .map_or(record.status, |view| view.status);
        seen.insert(record.tenant_id.clone());
        sessions.push(serde_json::json!({
            "tenant_id": record.tenant_id,
            "status": status,
            "message_count": record.message_count,
            "created_at": record.created_at,
        }));
    }
    for tenant_id in state.registry.tenant_ids() {
        if seen.contains(&tenant_id) {
            continue;
        }
        if let Some(view) = state.registry.get_session(&tenant_id) {
            sessions.push(serde_json::json!({
                "tenant_id": view.tenant_id,
                "status": view.status,
                "message_count": serde_json::Value::Null,
                "created_at": view.created_at,
            }));
        }
    }
    Json(serde_json::json!({ "sessions": sessions }))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    let Some(view) = state.registry.get_session(&tenant_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        );
    };

    // The live view carries no counter; read it from the persisted record.
    let message_count = match state.store.get(&tenant_id).await {
        Ok(record) => record.map(|r| r.message_count),
        Err(e) => {
            debug!(tenant_id, error = %e, "failed to read session record");
            None
        },
    };
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "tenant_id": view.tenant_id,
            "status": view.status,
            "created_at": view.created_at,
            "message_count": message_count,
        })),
    )
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    if state.registry.delete_session(&tenant_id).await {
        (StatusCode::OK, Json(serde_json::json!({ "deleted": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        )
    }
}

async fn qr_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.pending_auth_challenge(&tenant_id) {
        Some(qr) => (StatusCode::OK, Json(serde_json::json!({ "qr": qr }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no pending challenge" })),
        ),
    }
}

async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_events(socket, state))
}

/// Forward broadcast session events to one WebSocket client until either
/// side goes away.
async fn push_events(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(json) = event else {
                    // Lagged receivers skip ahead; a closed channel ends us.
                    match event {
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        _ => break,
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            },
            incoming = socket.recv() => {
                // Clients only listen; any close or error ends the stream.
                if !matches!(incoming, Some(Ok(_))) {
                    break;
                }
            },
        }
    }
}
