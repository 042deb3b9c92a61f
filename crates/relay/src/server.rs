use std::sync::Arc;

use {
    axum::{
        Form, Router,
        body::Body,
        extract::{Query, State},
        http::{StatusCode, header},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    tokio::net::TcpListener,
    tower_http::cors::{Any, CorsLayer},
    tracing::{debug, info},
};

use hagchat_protocol::{Message, kinds, validate_body, validate_kind, validate_label};

use crate::{broadcast::broadcast, state::RelayState, stream::StreamSession};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the relay router (shared between production startup and tests).
pub fn build_relay_app(relay: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stream", get(stream_handler))
        .route("/post", post(post_handler))
        .layer(cors)
        .with_state(AppState { relay })
}

/// Serve the relay on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, relay: Arc<RelayState>) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "relay listening");
    let app = build_relay_app(relay);
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn bad_request(reason: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, reason).into_response()
}

async fn health_handler(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "clients": app.relay.client_count().await,
    }))
}

#[derive(Deserialize)]
struct StreamParams {
    email: Option<String>,
}

/// Subscribe: open the long-lived push stream of newline-delimited JSON
/// records. The response body stays open for the connection's lifetime.
async fn stream_handler(
    State(app): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Response {
    let label = match params.email {
        Some(email) if validate_label(&email).is_ok() => email,
        other => {
            debug!(email = ?other, "stream: rejected label");
            return bad_request("email parameter invalid/missing");
        },
    };

    let (session, receiver) = StreamSession::connect(&app.relay, label).await;
    let body = Body::from_stream(session.into_body_stream(receiver));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

#[derive(Deserialize)]
struct PublishParams {
    email: Option<String>,
    text: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Publish: validate, construct the message, and hand it to the broadcaster.
/// Fire-and-forget — acceptance means "accepted for fan-out", not delivered.
async fn post_handler(
    State(app): State<AppState>,
    Form(params): Form<PublishParams>,
) -> Response {
    let Some(sender) = params.email.filter(|e| validate_label(e).is_ok()) else {
        return bad_request("email parameter invalid/missing");
    };
    let Some(body) = params.text.filter(|t| validate_body(t).is_ok()) else {
        return bad_request("text parameter invalid/missing");
    };
    let kind = match params.kind.filter(|k| !k.is_empty()) {
        Some(kind) => {
            if validate_kind(&kind).is_err() {
                return bad_request("type parameter invalid");
            }
            kind
        },
        None => kinds::TEXT.into(),
    };

    broadcast(&app.relay, &Message::text(sender, body, kind)).await;
    StatusCode::OK.into_response()
}
