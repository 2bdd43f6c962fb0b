//! Reply formatting: turns a pricing outcome (or a clarification need) into
//! the user-facing message text.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::intent::IntentAnalysis;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pricing::PricingOutcome;

/// Reply when more information is needed and the LLM is unavailable.
pub const CLARIFICATION_FALLBACK: &str = "I need more information to help you. \
Please provide the product ID and new price or discount amount.";

const FORMAT_TEMPERATURE: f32 = 0.7;
const FORMAT_MAX_TOKENS: u32 = 500;

const RESULT_PROMPT: &str = "\
You are a friendly assistant for suppliers managing their product prices over WhatsApp. \
Turn the operation result below into a short, natural reply. Match the user's language \
(Roman Urdu, Hindi or English). Keep the product ID and the prices exactly as given. \
If the operation was rejected, explain why in one or two sentences. Reply with the \
message text only.";

const CLARIFICATION_PROMPT: &str = "\
You are a friendly assistant for suppliers managing their product prices over WhatsApp. \
The user's request is missing information. Ask for exactly what is missing in a short, \
polite message, matching the user's language (Roman Urdu, Hindi or English). Mention \
that they can ask to increase a price, decrease a price or apply a discount, and that \
a product ID and amount are needed. Reply with the message text only.";

/// LLM-backed reply formatter with fixed fallbacks.
pub struct ResponseFormatter {
    llm: Arc<dyn LlmProvider>,
}

impl ResponseFormatter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Build the reply for one message.
    ///
    /// A clarification is requested whenever the analysis asks for one, even if
    /// an operation result is present. Otherwise the result is described.
    pub async fn format(
        &self,
        outcome: Option<&PricingOutcome>,
        analysis: &IntentAnalysis,
        original: &str,
    ) -> String {
        match outcome {
            Some(outcome) if !analysis.needs_clarification() => {
                self.format_result(outcome, analysis, original).await
            }
            _ => self.format_clarification(analysis, original).await,
        }
    }

    async fn format_result(
        &self,
        outcome: &PricingOutcome,
        analysis: &IntentAnalysis,
        original: &str,
    ) -> String {
        let details = serde_json::to_string(outcome).unwrap_or_default();
        let user = format!(
            "User message: {original}\n\
             Intent: {}\n\
             Result: {}\n\
             Details: {details}",
            analysis.intent.label(),
            outcome.summary(),
        );
        self.generate(RESULT_PROMPT, user)
            .await
            .unwrap_or_else(|| format!("Operation completed for product {}.", outcome.product_id()))
    }

    async fn format_clarification(&self, analysis: &IntentAnalysis, original: &str) -> String {
        let missing = analysis
            .clarification_needed
            .as_deref()
            .unwrap_or("product ID and amount");
        let user = format!(
            "User message: {original}\n\
             Detected intent: {}\n\
             Missing: {missing}",
            analysis.intent.label(),
        );
        self.generate(CLARIFICATION_PROMPT, user)
            .await
            .unwrap_or_else(|| CLARIFICATION_FALLBACK.to_string())
    }

    /// Non-blank completion text, or `None` on any failure.
    async fn generate(&self, system: &str, user: String) -> Option<String> {
        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(FORMAT_TEMPERATURE)
            .with_max_tokens(FORMAT_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(model = self.llm.model_name(), "Formatter returned empty text");
                    None
                } else {
                    debug!(chars = text.len(), "Formatted reply");
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "Reply formatting failed, using fallback");
                None
            }
        }
    }
}
