//! Message processing pipeline.
//!
//! Every inbound supplier message flows through:
//! 1. `MessageDeduplicator::seen()`: drop redelivered webhooks
//! 2. `ConversationStore`: history snapshot, then user turn appended
//! 3. `IntentExtractor::analyze()`: LLM reads intent, product id, amount
//! 4. `PricingGateway::apply()`: only when the request is complete
//! 5. `ResponseFormatter::format()`: reply text, appended to history
//!
//! Failures at any stage produce a fixed apology instead of an error.

pub mod processor;
pub mod types;

pub use processor::{FAILURE_REPLY, HISTORY_WINDOW, MessagePipeline};
pub use types::{InboundMessage, PipelineOutcome};
