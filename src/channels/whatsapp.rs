//! WhatsApp Cloud API channel: webhook payload decoding and outbound text
//! messages via `POST {base}/{version}/{phone_number_id}/messages`.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::config::WhatsAppSettings;
use crate::error::{ChannelError, WebhookError};
use crate::pipeline::InboundMessage;

/// Outbound send timeout.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

// ── Webhook payload ─────────────────────────────────────────────────

/// Delivery receipt for a message we sent (sent / delivered / read).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decoded webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    StatusUpdates(Vec<StatusUpdate>),
    Message(InboundMessage),
    /// Image, audio, location and other non-text messages.
    Unsupported { message_id: String, kind: String },
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
    #[serde(default)]
    value: Option<ChangeValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Default, Deserialize)]
struct Contact {
    #[serde(default)]
    wa_id: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Default, Deserialize)]
struct TextBody {
    #[serde(default)]
    body: Option<String>,
}

/// Classify a webhook body. Only the first entry / change / message is read.
pub fn parse_webhook(body: &Value) -> Result<WebhookEvent, WebhookError> {
    let payload: Payload = serde_json::from_value(body.clone())
        .map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let entry = payload
        .entry
        .into_iter()
        .next()
        .ok_or_else(|| WebhookError::Malformed("missing entry".into()))?;
    let change = entry
        .changes
        .into_iter()
        .next()
        .ok_or_else(|| WebhookError::Malformed("missing changes".into()))?;
    let value = change
        .value
        .ok_or_else(|| WebhookError::Malformed("missing value".into()))?;

    if !value.statuses.is_empty() {
        return Ok(WebhookEvent::StatusUpdates(value.statuses));
    }

    let Some(message) = value.messages.into_iter().next() else {
        return Err(WebhookError::Unrecognized);
    };

    let id = message
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WebhookError::Malformed("message without id".into()))?;

    let kind = message.kind.unwrap_or_else(|| "text".to_string());
    if kind != "text" {
        return Ok(WebhookEvent::Unsupported {
            message_id: id,
            kind,
        });
    }

    let text = message
        .text
        .and_then(|t| t.body)
        .ok_or_else(|| WebhookError::Malformed("text message without body".into()))?;

    let contact = value.contacts.into_iter().next().unwrap_or_default();
    let sender = contact
        .wa_id
        .or(message.from)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WebhookError::Malformed("message without sender".into()))?;

    Ok(WebhookEvent::Message(InboundMessage {
        id,
        sender,
        sender_name: contact.profile.and_then(|p| p.name),
        text,
        timestamp: message
            .timestamp
            .as_deref()
            .and_then(parse_epoch)
            .unwrap_or_else(Utc::now),
    }))
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

// ── Text post-processing ────────────────────────────────────────────

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【.*?】").expect("valid citation regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold regex"));

/// Adapt generated text to WhatsApp markup: drop `【…】` markers, `**x**` → `*x*`.
pub fn format_for_whatsapp(text: &str) -> String {
    let stripped = CITATION_RE.replace_all(text, "");
    BOLD_RE.replace_all(stripped.trim(), "*$1*").into_owned()
}

// ── Outbound ────────────────────────────────────────────────────────

/// Delivers reply text to a user.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), ChannelError>;
}

/// WhatsApp Cloud API sender.
pub struct WhatsAppClient {
    client: reqwest::Client,
    messages_url: String,
    access_token: SecretString,
}

impl WhatsAppClient {
    pub fn new(settings: &WhatsAppSettings) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        let messages_url = format!(
            "{}/{}/{}/messages",
            settings.api_base.trim_end_matches('/'),
            settings.api_version,
            settings.phone_number_id
        );
        Ok(Self {
            client,
            messages_url,
            access_token: settings.access_token.clone(),
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

/// JSON body for a plain text message.
pub fn text_message_body(recipient: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": recipient,
        "type": "text",
        "text": { "preview_url": false, "body": body },
    })
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(&self.messages_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&text_message_body(recipient, body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(recipient, "Timeout occurred while sending message");
                    ChannelError::Timeout {
                        recipient: recipient.to_string(),
                        timeout: SEND_TIMEOUT,
                    }
                } else {
                    error!(recipient, error = %e, "WhatsApp send request failed");
                    ChannelError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(recipient, status = %status, body = %text, "WhatsApp send rejected");
            return Err(ChannelError::SendFailed {
                recipient: recipient.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(recipient, body = %text, "WhatsApp send response");
        info!(recipient, chars = body.len(), "Reply delivered");
        Ok(())
    }
}
