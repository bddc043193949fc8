//! HTTP receiver for Telegram-shaped updates posted to the analysis endpoint.
//!
//! Every update is acknowledged with an empty `204 No Content`. When the
//! update carries `message.chat.id`, a greeting is sent to that chat from a
//! background task; failures there are only logged.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::analysis::ANALYSIS_ENDPOINT_PATH;
use crate::config::BotConfig;
use crate::localization::t;

#[derive(Clone, Debug)]
pub struct WebhookState {
    http: reqwest::Client,
    telegram_api_url: String,
    bot_token: String,
}

impl WebhookState {
    pub fn new(telegram_api_url: &str, bot_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            telegram_api_url: telegram_api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(&config.telegram_api_url, &config.bot_token)
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.telegram_api_url, self.bot_token)
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route(ANALYSIS_ENDPOINT_PATH, post(receive_update))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the webhook receiver until the process stops
pub async fn serve(addr: SocketAddr, state: WebhookState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;
    info!(%addr, "Webhook receiver listening");

    axum::serve(listener, router(state))
        .await
        .context("Webhook server stopped")?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_update(State(state): State<WebhookState>, body: Bytes) -> StatusCode {
    match chat_id_from_update(&body) {
        Some(chat_id) => {
            debug!(chat_id, "Update contains a message with a chat id");
            tokio::spawn(async move {
                if let Err(e) = send_greeting(&state, chat_id).await {
                    error!(chat_id, error = %e, "Error in background processing");
                }
            });
        }
        None => debug!(body_len = body.len(), "Update without a chat id"),
    }

    StatusCode::NO_CONTENT
}

/// Extract `message.chat.id` from a raw update body
pub fn chat_id_from_update(body: &[u8]) -> Option<i64> {
    let update: serde_json::Value = serde_json::from_slice(body).ok()?;
    update.pointer("/message/chat/id")?.as_i64()
}

/// Send the fixed greeting to `chat_id` through the Bot API
pub async fn send_greeting(state: &WebhookState, chat_id: i64) -> Result<()> {
    let greeting = t("webhook-greeting");
    state
        .http
        .post(state.send_message_url())
        .json(&SendMessage {
            chat_id,
            text: &greeting,
        })
        .send()
        .await
        .context("sendMessage request failed")?
        .error_for_status()
        .context("sendMessage returned an error status")?;

    debug!(chat_id, "Greeting sent");
    Ok(())
}
