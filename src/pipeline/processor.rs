//! Message pipeline: runs one inbound message through dedup, history,
//! intent extraction, pricing and reply formatting.
//!
//! Flow:
//! 1. Deduplicate by message id → drop repeats
//! 2. Snapshot recent history, then append the user turn
//! 3. Extract intent → gateway when complete, clarification otherwise
//! 4. Format reply → append assistant turn

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::conversation::{ConversationStore, TurnRole};
use crate::dedup::MessageDeduplicator;
use crate::error::PipelineError;
use crate::formatter::ResponseFormatter;
use crate::intent::IntentExtractor;
use crate::pipeline::types::{InboundMessage, PipelineOutcome};
use crate::pricing::PricingGateway;

/// History turns fetched as context for each message.
pub const HISTORY_WINDOW: usize = 10;

/// Reply sent when any stage fails.
pub const FAILURE_REPLY: &str =
    "There was a problem processing your request. Kindly try again.";

/// Per-message orchestrator. One instance is shared by all webhook tasks.
pub struct MessagePipeline {
    dedup: Arc<MessageDeduplicator>,
    conversations: Arc<ConversationStore>,
    extractor: IntentExtractor,
    gateway: Arc<PricingGateway>,
    formatter: ResponseFormatter,
}

impl MessagePipeline {
    pub fn new(
        dedup: Arc<MessageDeduplicator>,
        conversations: Arc<ConversationStore>,
        extractor: IntentExtractor,
        gateway: Arc<PricingGateway>,
        formatter: ResponseFormatter,
    ) -> Self {
        Self {
            dedup,
            conversations,
            extractor,
            gateway,
            formatter,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Process one message. Never fails: faults become `FAILURE_REPLY`.
    pub async fn handle(&self, message: &InboundMessage) -> PipelineOutcome {
        let span = info_span!(
            "pipeline",
            run_id = %Uuid::new_v4(),
            message_id = %message.id,
            user = %message.sender,
        );
        self.handle_inner(message).instrument(span).await
    }

    async fn handle_inner(&self, message: &InboundMessage) -> PipelineOutcome {
        if self.dedup.seen(&message.id) {
            info!("Skipping already processed message");
            return PipelineOutcome::Duplicate;
        }

        let result = AssertUnwindSafe(self.process(message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))));

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Pipeline failed, sending failure reply");
                FAILURE_REPLY.to_string()
            }
        };

        self.conversations
            .append(&message.sender, TurnRole::Assistant, reply.as_str())
            .await;
        PipelineOutcome::Reply(reply)
    }

    async fn process(&self, message: &InboundMessage) -> Result<String, PipelineError> {
        // The snapshot excludes the current message; the extractor appends it itself.
        let history = self
            .conversations
            .recent(&message.sender, HISTORY_WINDOW)
            .await;
        self.conversations
            .append(&message.sender, TurnRole::User, message.text.as_str())
            .await;

        let analysis = self.extractor.analyze(&message.text, &history).await;

        let outcome = match analysis.actionable() {
            Some((operation, product, amount)) => {
                Some(self.gateway.apply(operation, product, amount).await?)
            }
            None => {
                info!(intent = analysis.intent.label(), "Request incomplete, asking for clarification");
                None
            }
        };

        Ok(self
            .formatter
            .format(outcome.as_ref(), &analysis, &message.text)
            .await)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
