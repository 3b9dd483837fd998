//! Routing of inbound Telegram messages.
//!
//! Parse failures carry their own user-facing message; integration failures
//! are logged here — the boundary that decides they are recoverable — and
//! answered with a generic apology.

use chrono::Utc;
use chrono_tz::Tz;
use log::error;
use std::sync::Arc;

use crate::app::AppState;
use crate::calendar::NewEvent;
use crate::parser::{self, ParsedEvent};
use crate::telegram::Update;

const GREETING: &str = "Привет! Я добавляю события в Google Календарь. \
Пример: 'завтра в 11:00 встреча на 30 минут'";

/// Entry point for one webhook update.
pub async fn handle_update(state: &Arc<AppState>, update: Update) {
    let Some(message) = update.message else {
        return;
    };
    let chat_id = message.chat.id.to_string();
    if let Some(allowed) = &state.config.allowed_chat_id {
        if *allowed != chat_id {
            return;
        }
    }
    match message.text {
        Some(text) => handle_text(state, &chat_id, &text).await,
        None => {
            state.telegram.send_message(&chat_id, "Пришлите текстовое сообщение.").await;
        }
    }
}

pub async fn handle_text(state: &Arc<AppState>, chat_id: &str, text: &str) {
    if text.starts_with("/start") {
        state.telegram.send_message(chat_id, GREETING).await;
        return;
    }
    if text.starts_with("/tz") {
        handle_tz(state, chat_id, text).await;
        return;
    }
    if text.starts_with("/connect") {
        handle_connect(state, chat_id).await;
        return;
    }
    let event_text = text.strip_prefix("/add").map(str::trim).unwrap_or(text);
    handle_add(state, chat_id, event_text).await;
}

async fn handle_tz(state: &Arc<AppState>, chat_id: &str, text: &str) {
    let Some(zone) = text.split_whitespace().nth(1) else {
        state
            .telegram
            .send_message(chat_id, "Укажите часовой пояс, например: /tz Europe/Moscow")
            .await;
        return;
    };
    if zone.parse::<Tz>().is_err() {
        state
            .telegram
            .send_message(chat_id, "Неизвестный часовой пояс. Пример: Europe/Moscow")
            .await;
        return;
    }
    let saved = state.store.with_user(chat_id, |user| user.tz = zone.to_string()).await;
    match saved {
        Ok(()) => {
            state
                .telegram
                .send_message(chat_id, &format!("Часовой пояс установлен: {zone}"))
                .await;
        }
        Err(e) => {
            error!("failed to save timezone for chat {chat_id}: {e:#}");
            state.telegram.send_message(chat_id, "Произошла внутренняя ошибка").await;
        }
    }
}

async fn handle_connect(state: &Arc<AppState>, chat_id: &str) {
    let Some(oauth) = &state.oauth else {
        state.telegram.send_message(chat_id, "Google OAuth не настроен").await;
        return;
    };
    let auth_state = state.pending.issue(chat_id);
    match oauth.authorize_url(&auth_state) {
        Ok(url) => {
            state.telegram.send_message(chat_id, &format!("Авторизация Google: {url}")).await;
        }
        Err(e) => {
            error!("failed to build auth URL for chat {chat_id}: {e:#}");
            state.telegram.send_message(chat_id, "Произошла внутренняя ошибка").await;
        }
    }
}

async fn handle_add(state: &Arc<AppState>, chat_id: &str, event_text: &str) {
    let profile = state.store.get_user(chat_id).await;

    let event = match parser::parse_event(event_text, &profile.tz, Utc::now()) {
        Ok(event) => event,
        Err(e) => {
            state.telegram.send_message(chat_id, &e.to_string()).await;
            return;
        }
    };

    let Some(tokens) = profile.creds else {
        state.telegram.send_message(chat_id, "Сначала выполните: /connect").await;
        return;
    };

    match insert_event(state, chat_id, tokens, &event).await {
        Ok(()) => {
            let confirmation = format!(
                "✅ Добавлено: {}\n🕒 {}",
                event.title,
                event.start.format("%d.%m %H:%M")
            );
            state.telegram.send_message(chat_id, &confirmation).await;
        }
        Err(e) => {
            error!("failed to add event for chat {chat_id}: {e:#}");
            state.telegram.send_message(chat_id, "Ошибка при добавлении события").await;
        }
    }
}

async fn insert_event(
    state: &Arc<AppState>,
    chat_id: &str,
    tokens: crate::oauth::GoogleTokens,
    event: &ParsedEvent,
) -> anyhow::Result<()> {
    let tokens = state.fresh_tokens(chat_id, tokens).await?;
    let new_event = NewEvent {
        summary: event.title.clone(),
        start: event.start,
        end: event.end,
        timezone: event.timezone,
    };
    let created = state.calendar.insert_event(&tokens, &new_event).await?;
    log::debug!("event {} created for chat {chat_id}", created.id);
    Ok(())
}
