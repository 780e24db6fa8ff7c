use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use tracing::{error, instrument, warn};

use crate::meals::services::{self, ACK_MESSAGE, APOLOGY_MESSAGE};
use crate::meals::summary::{self, Span};
use crate::state::AppState;

const USAGE_HINT: &str =
    "Send me a food photo to log a meal, or say \"today\" or \"week\" for a summary.";

/// Inbound delivery: a batch of independent events. Signature verification
/// happens upstream of this handler.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<InboundEvent>,
}

#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventSource {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub text: Option<String>,
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// Events in one delivery are isolated: each is handled on its own and a
/// failure in one never affects the others.
#[instrument(skip(state, payload), fields(events = payload.events.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    for event in payload.events {
        handle_event(state.clone(), event).await;
    }
    StatusCode::OK
}

async fn handle_event(state: AppState, event: InboundEvent) {
    if event.kind != "message" {
        return;
    }
    let Some(user_id) = event.source.and_then(|s| s.user_id) else {
        warn!("message event without a user identity, skipping");
        return;
    };
    let Some(message) = event.message else {
        return;
    };

    match message.kind.as_str() {
        "image" => {
            // Acknowledge now; the expensive pipeline runs detached and
            // reports back via push.
            if let Some(token) = event.reply_token {
                if let Err(e) = state.channel.reply(&token, &[ACK_MESSAGE.to_string()]).await {
                    warn!(error = %e, "failed to send acknowledgment");
                }
            }
            tokio::spawn(services::run_image_pipeline(state, user_id, message.id));
        }
        "text" => {
            let text = message.text.unwrap_or_default();
            handle_text(state, user_id, event.reply_token, &text).await;
        }
        other => {
            warn!(kind = other, "unsupported message type, ignoring");
        }
    }
}

async fn handle_text(state: AppState, user_id: String, reply_token: Option<String>, text: &str) {
    let reply = match Span::parse(text) {
        Some(span) => {
            match summary::summarize(&state.db, state.config.tz_offset, &user_id, span).await {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, %user_id, "summary failed");
                    APOLOGY_MESSAGE.to_string()
                }
            }
        }
        None => USAGE_HINT.to_string(),
    };

    let Some(token) = reply_token else {
        return;
    };
    if let Err(e) = state.channel.reply(&token, &[reply]).await {
        error!(error = %e, %user_id, "failed to reply");
    }
}
