//! HTTP ingress: WhatsApp webhook verification and event intake.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::channels::{MessageSender, WebhookEvent, format_for_whatsapp, parse_webhook};
use crate::error::WebhookError;
use crate::pipeline::{InboundMessage, MessagePipeline, PipelineOutcome};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MessagePipeline>,
    pub sender: Arc<dyn MessageSender>,
    pub verify_token: String,
}

/// Build the bot's router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "supplier-bot"
    }))
}

// ── Verification handshake ──────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Why a verification request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifyRejection {
    MissingParameters,
    Mismatch,
}

fn check_subscription(params: &VerifyParams, expected_token: &str) -> Result<String, VerifyRejection> {
    let (Some(mode), Some(token)) = (params.mode.as_deref(), params.token.as_deref()) else {
        return Err(VerifyRejection::MissingParameters);
    };
    if mode == "subscribe" && token == expected_token {
        Ok(params.challenge.clone().unwrap_or_default())
    } else {
        Err(VerifyRejection::Mismatch)
    }
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match check_subscription(&params, &state.verify_token) {
        Ok(challenge) => {
            info!("Webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        Err(VerifyRejection::Mismatch) => {
            info!("Webhook verification failed");
            error_response(StatusCode::FORBIDDEN, "Verification failed")
        }
        Err(VerifyRejection::MissingParameters) => {
            info!("Webhook verification missing parameters");
            error_response(StatusCode::BAD_REQUEST, "Missing parameters")
        }
    }
}

// ── Event intake ────────────────────────────────────────────────────

async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "Failed to decode webhook JSON");
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON provided");
        }
    };
    info!(
        object = payload.get("object").and_then(|v| v.as_str()).unwrap_or("-"),
        "Received webhook event"
    );

    match parse_webhook(&payload) {
        Ok(WebhookEvent::StatusUpdates(statuses)) => {
            for s in &statuses {
                info!(
                    status = s.status.as_deref().unwrap_or("-"),
                    message_id = s.id.as_deref().unwrap_or("-"),
                    recipient = s.recipient_id.as_deref().unwrap_or("-"),
                    timestamp = s.timestamp.as_deref().unwrap_or("-"),
                    "Status update"
                );
            }
            ok_response()
        }
        Ok(WebhookEvent::Message(message)) => {
            tokio::spawn(dispatch(state, message));
            ok_response()
        }
        Ok(WebhookEvent::Unsupported { message_id, kind }) => {
            info!(message_id = %message_id, kind = %kind, "Ignoring non-text message");
            ok_response()
        }
        Err(WebhookError::Malformed(reason)) => {
            warn!(reason = %reason, "Invalid WhatsApp message format");
            error_response(StatusCode::BAD_REQUEST, "Invalid message format")
        }
        Err(WebhookError::Unrecognized) => {
            warn!(body = %payload, "Unrecognized event type");
            error_response(StatusCode::BAD_REQUEST, "Unrecognized event type")
        }
    }
}

/// Run the pipeline for one message and deliver the reply.
async fn dispatch(state: AppState, message: InboundMessage) {
    let PipelineOutcome::Reply(reply) = state.pipeline.handle(&message).await else {
        return;
    };
    let text = format_for_whatsapp(&reply);
    if let Err(e) = state.sender.send_text(&message.sender, &text).await {
        error!(message_id = %message.id, error = %e, "Failed to deliver reply");
    }
}

fn ok_response() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "message": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyParams {
        VerifyParams {
            mode: mode.map(str::to_string),
            token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn subscription_with_correct_token_returns_challenge() {
        let p = params(Some("subscribe"), Some("secret"), Some("1158201444"));
        assert_eq!(check_subscription(&p, "secret").unwrap(), "1158201444");
    }

    #[test]
    fn wrong_token_or_mode_is_mismatch() {
        let p = params(Some("subscribe"), Some("wrong"), Some("x"));
        assert_eq!(check_subscription(&p, "secret"), Err(VerifyRejection::Mismatch));
        let p = params(Some("unsubscribe"), Some("secret"), Some("x"));
        assert_eq!(check_subscription(&p, "secret"), Err(VerifyRejection::Mismatch));
    }

    #[test]
    fn missing_mode_or_token_is_missing_parameters() {
        let p = params(None, Some("secret"), Some("x"));
        assert_eq!(
            check_subscription(&p, "secret"),
            Err(VerifyRejection::MissingParameters)
        );
        let p = params(Some("subscribe"), None, None);
        assert_eq!(
            check_subscription(&p, "secret"),
            Err(VerifyRejection::MissingParameters)
        );
    }

    #[test]
    fn query_names_use_hub_prefix() {
        let p: VerifyParams = serde_json::from_value(json!({
            "hub.mode": "subscribe",
            "hub.verify_token": "t",
            "hub.challenge": "c"
        }))
        .unwrap();
        assert_eq!(p.mode.as_deref(), Some("subscribe"));
        assert_eq!(p.token.as_deref(), Some("t"));
        assert_eq!(p.challenge.as_deref(), Some("c"));
    }
}
