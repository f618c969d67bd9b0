// src/api.rs
//! Thin HTTP port for a chat UI: taps and replies come in, bot messages go out.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::conversation::ConversationStatus;
use crate::message::OutboundMessage;
use crate::session::{Session, SessionState, UserReply};
use crate::transcript::TranscriptEntry;

const DEFAULT_MESSAGES: usize = 50;
const MAX_MESSAGES: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/conversation/open", post(open_conversation))
        .route("/conversation/reply", post(reply))
        .route("/conversation/messages", get(messages))
        .route("/debug/state", get(debug_state))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::warn!(target: "api", "request failed: {e:#}");
        ApiError(StatusCode::BAD_GATEWAY, format!("{e:#}"))
    }
}

#[derive(Serialize)]
struct TurnResp {
    message: Option<OutboundMessage>,
    status: Option<ConversationStatus>,
    remaining: usize,
}

impl TurnResp {
    fn from_session(message: Option<OutboundMessage>, session: &Session) -> Self {
        let state = session.state();
        Self {
            message,
            status: state.status,
            remaining: state.remaining,
        }
    }
}

async fn open_conversation(State(state): State<AppState>) -> Result<Json<TurnResp>, ApiError> {
    let mut session = state.session.lock().await;
    let message = session.open().await?;
    Ok(Json(TurnResp::from_session(message, &session)))
}

#[derive(Deserialize)]
struct ReplyReq {
    text: String,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    sender_name: Option<String>,
}

async fn reply(State(state): State<AppState>, Json(body): Json<ReplyReq>) -> Result<Json<TurnResp>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "text must not be empty".into()));
    }
    let mut session = state.session.lock().await;
    let conversation = session.conversation_id().to_string();
    let reply = UserReply {
        sender_id: body.sender_id.unwrap_or(conversation),
        sender_name: body.sender_name.unwrap_or_else(|| "You".to_string()),
        text: body.text,
    };
    let message = session.reply(reply).await?;
    Ok(Json(TurnResp::from_session(message, &session)))
}

#[derive(Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

async fn messages(State(state): State<AppState>, Query(q): Query<MessagesQuery>) -> Json<Vec<TranscriptEntry>> {
    let n = q.limit.unwrap_or(DEFAULT_MESSAGES).min(MAX_MESSAGES);
    let session = state.session.lock().await;
    Json(session.transcript(n))
}

async fn debug_state(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.lock().await.state())
}
