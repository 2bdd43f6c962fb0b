//! Supplier Bot: WhatsApp assistant for supplier price changes.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod dedup;
pub mod error;
pub mod formatter;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod pricing;
pub mod server;
pub mod sync;
