//! LLM integration.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core
//! - **Anthropic**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait. Both the intent
//! extractor and the response formatter hold an `Arc<dyn LlmProvider>`.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::LlmSettings;
use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
}

/// Create an LLM provider from configuration.
pub fn create_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match settings.backend {
        LlmBackend::OpenAi => create_openai_provider(settings),
        LlmBackend::Anthropic => create_anthropic_provider(settings),
    }
}

fn create_openai_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(settings.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&settings.model);
    tracing::info!("Using OpenAI (model: {})", settings.model);
    Ok(adapter(model, settings, "openai"))
}

fn create_anthropic_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(settings.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&settings.model);
    tracing::info!("Using Anthropic (model: {})", settings.model);
    Ok(adapter(model, settings, "anthropic"))
}

fn adapter<M>(model: M, settings: &LlmSettings, provider: &'static str) -> Arc<dyn LlmProvider>
where
    M: rig::completion::CompletionModel + Send + Sync + 'static,
{
    let timeout = if settings.timeout.is_zero() {
        Duration::from_secs(60)
    } else {
        settings.timeout
    };
    Arc::new(RigAdapter::new(model, &settings.model, provider, timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(backend: LlmBackend, model: &str) -> LlmSettings {
        LlmSettings {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_create_openai_provider() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let provider = create_provider(&settings(LlmBackend::OpenAi, "gpt-4o-mini"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_create_anthropic_provider() {
        let provider = create_provider(&settings(LlmBackend::Anthropic, "claude-3-5-haiku-latest"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-haiku-latest");
    }
}
