//! Webhook and OAuth-callback HTTP server.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::commands;
use crate::telegram::Update;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/webhook", post(webhook))
        .route("/auth/callback", get(auth_callback))
        .with_state(state)
}

async fn index() -> &'static str {
    "Service is running"
}

// Telegram expects a 2xx no matter what; anything else makes it redeliver the
// same update over and over.
async fn webhook(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Json<Value> {
    match serde_json::from_value::<Update>(body) {
        Ok(update) => commands::handle_update(&state, update).await,
        Err(e) => error!("undecodable webhook update: {e}"),
    }
    Json(json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
struct AuthCallbackQuery {
    state: Option<String>,
    code: Option<String>,
}

async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthCallbackQuery>,
) -> (StatusCode, &'static str) {
    let (Some(auth_state), Some(code)) = (query.state, query.code) else {
        return (StatusCode::BAD_REQUEST, "Invalid request");
    };
    let Some(chat_id) = state.pending.redeem(&auth_state) else {
        return (StatusCode::BAD_REQUEST, "Invalid request");
    };
    let Some(oauth) = &state.oauth else {
        return (StatusCode::BAD_REQUEST, "Invalid request");
    };

    let tokens = match oauth.exchange_code(&code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("code exchange for chat {chat_id} failed: {e:#}");
            return (StatusCode::BAD_REQUEST, "Authentication failed");
        }
    };

    if let Err(e) = state
        .store
        .with_user(&chat_id, |user| user.creds = Some(tokens.clone()))
        .await
    {
        error!("failed to store credentials for chat {chat_id}: {e:#}");
        return (StatusCode::BAD_REQUEST, "Authentication failed");
    }

    info!("Google Calendar connected for chat {chat_id}");
    state.telegram.send_message(&chat_id, "✅ Google Calendar подключен!").await;
    (StatusCode::OK, "Authenticated successfully")
}
