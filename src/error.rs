//! Error types for the supplier bot.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Failures talking to the external pricing service.
///
/// Business rejections (cooldown, threshold, invalid discount) are not errors;
/// see [`crate::pricing::PriceRejection`].
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Pricing service unavailable for product {product_id}: {reason}")]
    UpstreamUnavailable { product_id: String, reason: String },
}

/// Price ledger persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound messaging errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Send to {recipient} timed out after {timeout:?}")]
    Timeout { recipient: String, timeout: Duration },

    #[error("Send to {recipient} failed with status {status}: {body}")]
    SendFailed {
        recipient: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Inbound webhook payload errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(String),

    #[error("Unrecognized webhook event")]
    Unrecognized,
}

/// Intent extraction errors. Never surfaced past the extractor.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Failed to parse intent response: {0}")]
    ParseFailure(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Faults that reach the pipeline boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Stage panicked: {0}")]
    Panicked(String),
}
