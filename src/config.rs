//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Default chat model used for both intent extraction and reply generation.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// LLM settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
}

/// WhatsApp Cloud API settings.
#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub verify_token: String,
    pub api_version: String,
    pub api_base: String,
}

/// External pricing service settings.
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub update_url: String,
    /// Discounts go to their own deployment when configured.
    pub discount_url: String,
    pub timeout: Duration,
}

/// Whole-process configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub llm: LlmSettings,
    pub whatsapp: WhatsAppSettings,
    pub pricing: PricingSettings,
    /// Where the price-increase ledger is persisted.
    pub ledger_path: PathBuf,
    /// How long processed message ids are remembered. `None` keeps them forever.
    pub dedup_retention: Option<Duration>,
    pub port: u16,
    /// Optional directory for a daily rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let backend = match env.optional("LLM_BACKEND").as_deref() {
            None | Some("openai") => LlmBackend::OpenAi,
            Some("anthropic") => LlmBackend::Anthropic,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LLM_BACKEND".into(),
                    message: format!("unknown backend '{other}' (expected openai or anthropic)"),
                });
            }
        };
        let api_key_var = match backend {
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        };

        let llm = LlmSettings {
            backend,
            api_key: SecretString::from(env.required(api_key_var)?),
            model: env
                .optional("SUPPLIER_BOT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(env.parsed("LLM_TIMEOUT_SECS", 60)?),
        };

        let whatsapp = WhatsAppSettings {
            access_token: SecretString::from(env.required("WHATSAPP_ACCESS_TOKEN")?),
            phone_number_id: env.required("WHATSAPP_PHONE_NUMBER_ID")?,
            verify_token: env.required("WHATSAPP_VERIFY_TOKEN")?,
            api_version: env
                .optional("WHATSAPP_API_VERSION")
                .unwrap_or_else(|| "v18.0".to_string()),
            api_base: env
                .optional("WHATSAPP_API_BASE")
                .unwrap_or_else(|| "https://graph.facebook.com".to_string()),
        };

        let update_url = env.required("PRICING_UPDATE_URL")?;
        let pricing = PricingSettings {
            discount_url: env
                .optional("PRICING_DISCOUNT_URL")
                .unwrap_or_else(|| update_url.clone()),
            update_url,
            timeout: Duration::from_secs(env.parsed("PRICING_TIMEOUT_SECS", 30)?),
        };

        let retention_hours: u64 = env.parsed("SUPPLIER_BOT_DEDUP_RETENTION_HOURS", 168)?;
        let dedup_retention =
            (retention_hours > 0).then(|| Duration::from_secs(retention_hours * 3600));

        Ok(Self {
            llm,
            whatsapp,
            pricing,
            ledger_path: env
                .optional("SUPPLIER_BOT_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/price_increase_log.json")),
            dedup_retention,
            port: env.parsed("SUPPLIER_BOT_PORT", 8000)?,
            log_dir: env.optional("SUPPLIER_BOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
