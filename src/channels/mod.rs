//! Messaging channels.

pub mod whatsapp;

pub use whatsapp::{
    MessageSender, StatusUpdate, WebhookEvent, WhatsAppClient, format_for_whatsapp, parse_webhook,
};
