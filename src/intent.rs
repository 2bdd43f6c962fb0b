//! Intent extraction: turns a supplier's free-text message plus recent
//! history into a structured [`IntentAnalysis`].
//!
//! Extraction never fails: provider errors and unparsable replies degrade to
//! an `unclear` analysis that asks the user to rephrase.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conversation::{ConversationTurn, TurnRole};
use crate::error::IntentError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pricing::{PriceOperation, ProductId};

/// History turns included in the extraction prompt.
pub const CONTEXT_TURNS: usize = 5;

/// Clarification text used when the model reply cannot be understood.
pub const PARSE_FAILURE_CLARIFICATION: &str = "could not understand request";

const EXTRACT_TEMPERATURE: f32 = 0.3;
const EXTRACT_MAX_TOKENS: u32 = 1000;

/// What the supplier asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PriceIncrease,
    PriceDecrease,
    Discount,
    Unclear,
}

impl Intent {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "price_increase" | "increase" => Self::PriceIncrease,
            "price_decrease" | "decrease" => Self::PriceDecrease,
            "discount" => Self::Discount,
            _ => Self::Unclear,
        }
    }

    /// The pricing operation this intent maps to, if any.
    pub fn operation(self) -> Option<PriceOperation> {
        match self {
            Self::PriceIncrease => Some(PriceOperation::Increase),
            Self::PriceDecrease => Some(PriceOperation::Decrease),
            Self::Discount => Some(PriceOperation::Discount),
            Self::Unclear => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PriceIncrease => "price_increase",
            Self::PriceDecrease => "price_decrease",
            Self::Discount => "discount",
            Self::Unclear => "unclear",
        }
    }
}

/// Model's self-reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Structured reading of one message. Produced fresh per message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub product_id: Option<ProductId>,
    pub amount: Option<f64>,
    pub confidence: Confidence,
    pub clarification_needed: Option<String>,
}

impl IntentAnalysis {
    /// Fallback for replies that could not be understood.
    pub fn unclear(reason: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unclear,
            product_id: None,
            amount: None,
            confidence: Confidence::Low,
            clarification_needed: Some(reason.into()),
        }
    }

    /// The operation to run, when intent, product id and amount are all present.
    pub fn actionable(&self) -> Option<(PriceOperation, &ProductId, f64)> {
        let operation = self.intent.operation()?;
        let product = self.product_id.as_ref()?;
        let amount = self.amount?;
        Some((operation, product, amount))
    }

    pub fn needs_clarification(&self) -> bool {
        self.intent == Intent::Unclear || self.clarification_needed.is_some()
    }
}

/// LLM-backed intent extractor.
pub struct IntentExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl IntentExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Analyze `message` given the conversation so far (oldest first).
    pub async fn analyze(&self, message: &str, history: &[ConversationTurn]) -> IntentAnalysis {
        match self.try_analyze(message, history).await {
            Ok(analysis) => {
                info!(
                    intent = analysis.intent.label(),
                    product_id = analysis.product_id.as_ref().map(|p| p.as_str()).unwrap_or("-"),
                    amount = ?analysis.amount,
                    confidence = ?analysis.confidence,
                    "Intent extracted"
                );
                analysis
            }
            Err(e) => {
                warn!(error = %e, "Intent extraction failed, asking for clarification");
                IntentAnalysis::unclear(PARSE_FAILURE_CLARIFICATION)
            }
        }
    }

    async fn try_analyze(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<IntentAnalysis, IntentError> {
        let request = CompletionRequest::new(build_messages(message, history))
            .with_temperature(EXTRACT_TEMPERATURE)
            .with_max_tokens(EXTRACT_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        debug!(raw_response = %response.content, "Intent extractor raw response");
        parse_intent_response(&response.content)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "\
You are the query identifier for a supplier price management system. Suppliers \
message you on WhatsApp, often in Roman Urdu / Hindi mixed with English. Decide:
1. Does the supplier want to increase a product's price? (price_increase)
2. Does the supplier want to decrease a product's price? (price_decrease)
3. Does the supplier want to apply a discount to a product? (discount)
4. Which product ID and which price / amount did they mention?

Respond with ONLY a JSON object:
{\"intent\": \"price_increase\" | \"price_decrease\" | \"discount\" | \"unclear\", \
\"product_id\": \"product ID or null\", \
\"amount\": \"price or discount amount or null\", \
\"confidence\": \"high\" | \"medium\" | \"low\", \
\"clarification_needed\": \"what is missing, or null\"}

Vocabulary:
- \"barha do\", \"barha dou\", \"barhao\", \"zyada kar do\", \"increase kar do\" = price_increase
- \"kam kar do\", \"kam karo\", \"ghata do\", \"decrease kar do\" = price_decrease
- \"discount laga do\", \"discount lagao\", \"sale laga do\" = discount
- \"qeemat\", \"price\", \"rate\" all mean price

Examples:
- \"ABC123 ki price 50 kar do\" -> price change to 50 for ABC123
- \"XYZ789 ki qeemat barha do 100\" -> price_increase, XYZ789, 100
- \"product DEF456 kam kar do price 30\" -> price_decrease, DEF456, 30
- \"GHI789 pe 20 ka discount laga do\" -> discount, GHI789, 20
- \"price kam karni hai\" -> unclear, product ID and amount needed
- \"qeemat barha dou\" -> unclear, product ID and amount needed
- \"discount lagana hai\" -> unclear, product ID and amount needed

Rules:
- If the product ID or the amount is missing, say so in clarification_needed.
- Use earlier messages in the conversation to fill in a missing product ID or amount.
- Use null, not an empty string, for anything you do not know.";

/// Build the extraction prompt: instructions, last `CONTEXT_TURNS` turns, then the message.
fn build_messages(message: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(CONTEXT_TURNS);
    let mut messages = Vec::with_capacity(CONTEXT_TURNS + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    for turn in history.iter().skip(skip) {
        messages.push(match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        });
    }
    messages.push(ChatMessage::user(message));
    messages
}

// ── Response parsing ────────────────────────────────────────────────

/// Model reply before normalization. Every field is optional and loosely typed.
#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    product_id: Option<serde_json::Value>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    clarification_needed: Option<serde_json::Value>,
}

fn parse_intent_response(raw: &str) -> Result<IntentAnalysis, IntentError> {
    let json_str = extract_json_object(raw);
    let parsed: RawIntent = serde_json::from_str(&json_str)
        .map_err(|e| IntentError::ParseFailure(format!("{e}: {raw}")))?;

    Ok(IntentAnalysis {
        intent: parsed.intent.as_deref().map(Intent::parse).unwrap_or(Intent::Unclear),
        product_id: parsed
            .product_id
            .as_ref()
            .and_then(value_text)
            .and_then(|s| ProductId::parse(&s)),
        amount: parsed.amount.as_ref().and_then(parse_amount),
        confidence: parsed
            .confidence
            .as_deref()
            .map(Confidence::parse)
            .unwrap_or(Confidence::Low),
        clarification_needed: parsed
            .clarification_needed
            .as_ref()
            .and_then(value_text)
            .filter(|s| !is_placeholder(s)),
    })
}

/// Text content of a JSON string or number, ignoring null-like placeholders.
fn value_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!is_placeholder(&text)).then_some(text)
}

fn is_placeholder(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "" | "null" | "none" | "n/a" | "na" | "-"
    )
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

/// Positive amount from a number or from text like "Rs. 1,250" or "20%".
fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let cleaned = s.replace(',', "");
            NUMBER_RE.find(&cleaned)?.as_str().parse().ok()?
        }
        _ => return None,
    };
    (amount.is_finite() && amount > 0.0).then_some(amount)
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
