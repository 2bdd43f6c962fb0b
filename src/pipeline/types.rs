//! Shared types for the message processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A text message from a supplier, as decoded by the channel adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel-native message id, used for deduplication.
    pub id: String,
    /// Sender identifier (WhatsApp wa_id). Also the conversation key.
    pub sender: String,
    /// Profile name, if the channel provided one.
    pub sender_name: Option<String>,
    /// Message body.
    pub text: String,
    /// When the channel says the message was sent.
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Message id already processed. Nothing was done.
    Duplicate,
    /// Reply text for the sender.
    Reply(String),
}

impl PipelineOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Duplicate => None,
            Self::Reply(text) => Some(text),
        }
    }
}
