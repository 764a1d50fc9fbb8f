//! Telegram Bot API boundary: decoding webhook updates into engine events and
//! rendering engine replies back into sendMessage calls. Delivery is
//! fire-and-forget; a failed send is logged and never fed back into the
//! dialog state.

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::engine::{InboundEvent, Outbound};
use crate::domain::keyboard::Keyboard;

pub const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Account>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub from: Account,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Updates the bot does not handle (joins, edits, stickers) decode to None
/// and are acknowledged without any reply.
pub fn decode_update(update: Update) -> Option<InboundEvent> {
    if let Some(callback) = update.callback_query {
        let data = callback.data?;
        let chat_id = callback
            .message
            .map(|message| message.chat.id)
            .unwrap_or(callback.from.id);
        return Some(InboundEvent::Callback {
            user_id: callback.from.id,
            chat_id,
            data,
        });
    }

    let message = update.message?;
    let from = message.from?;
    let text = message.text?;
    Some(InboundEvent::Text {
        user_id: from.id,
        chat_id: message.chat.id,
        username: from.username.unwrap_or_default(),
        text,
    })
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram api rejected the call: {0}")]
    Api(String),
}

/// Outgoing side of the chat service. Object-safe so the HTTP client can be
/// swapped for a recorder in tests.
pub trait ChatTransport: Send + Sync {
    fn send(&self, outbound: &Outbound) -> Result<(), TransportError>;
}

/// Sends every reply, logging failures instead of propagating them.
pub fn deliver_all(transport: &dyn ChatTransport, outbounds: &[Outbound]) {
    for outbound in outbounds {
        if let Err(error) = transport.send(outbound) {
            tracing::warn!(error = %error, chat_id = outbound.chat_id, "send failed");
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramHttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl TelegramHttpTransport {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(base: &str, token: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: format!("{base}/bot{token}"),
        }
    }

    fn call(&self, method: &str, payload: &Value) -> Result<(), TransportError> {
        let response: ApiResponse = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(payload)
            .send()?
            .json()?;
        if response.ok {
            Ok(())
        } else {
            Err(TransportError::Api(
                response.description.unwrap_or_else(|| "no description".to_string()),
            ))
        }
    }

    /// Points the bot's webhook at the public URL once at startup.
    pub fn set_webhook(&self, url: &str) -> Result<(), TransportError> {
        self.call("setWebhook", &json!({ "url": url }))
    }
}

impl ChatTransport for TelegramHttpTransport {
    fn send(&self, outbound: &Outbound) -> Result<(), TransportError> {
        let mut payload = json!({
            "chat_id": outbound.chat_id,
            "text": outbound.text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = &outbound.keyboard {
            payload["reply_markup"] = render_markup(keyboard);
        }
        self.call("sendMessage", &payload)
    }
}

pub fn render_markup(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Reply {
            rows,
            one_time,
            placeholder,
        } => {
            let buttons: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
                .collect();
            let mut markup = json!({
                "keyboard": buttons,
                "resize_keyboard": true,
                "one_time_keyboard": one_time,
            });
            if let Some(placeholder) = placeholder {
                markup["input_field_placeholder"] = json!(placeholder);
            }
            markup
        }
        Keyboard::Inline { rows } => {
            let buttons: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| {
                            json!({ "text": button.label, "callback_data": button.data })
                        })
                        .collect()
                })
                .collect();
            json!({ "inline_keyboard": buttons })
        }
    }
}
