//! Fake pricing service shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// One recorded POST.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub endpoint: &'static str,
    pub body: Value,
}

/// In-memory pricing upstream with `/update` and `/discount` endpoints.
#[derive(Default)]
pub struct FakePricing {
    quotes: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<RecordedWrite>>,
    /// Respond to every request with this status instead.
    fail_status: Option<u16>,
    /// Sleep before answering.
    delay: Option<Duration>,
}

impl FakePricing {
    pub fn with_quote(self, code: &str, price: f64, old_price: f64, shipping: f64) -> Self {
        self.quotes.lock().unwrap().insert(
            code.to_string(),
            json!({
                "update_price": price,
                "update_oldPrice": old_price,
                "update_additionalshippingcharges": shipping,
            }),
        );
        self
    }

    pub fn failing_with(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_raw_quote(self, code: &str, body: Value) -> Self {
        self.quotes.lock().unwrap().insert(code.to_string(), body);
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }
}

/// A running fake; URLs point at the bound port.
pub struct FakePricingServer {
    pub state: Arc<FakePricing>,
    pub update_url: String,
    pub discount_url: String,
}

pub async fn start_fake_pricing(fake: FakePricing) -> FakePricingServer {
    let state = Arc::new(fake);
    let app = Router::new()
        .route("/update", get(quote).post(write_update))
        .route("/discount", get(quote).post(write_discount))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    FakePricingServer {
        state,
        update_url: format!("http://127.0.0.1:{port}/update"),
        discount_url: format!("http://127.0.0.1:{port}/discount"),
    }
}

async fn pause_or_fail(state: &FakePricing) -> Option<Response> {
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    state.fail_status.map(|code| {
        let status = StatusCode::from_u16(code).unwrap();
        (status, "upstream exploded").into_response()
    })
}

async fn quote(
    State(state): State<Arc<FakePricing>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(resp) = pause_or_fail(&state).await {
        return resp;
    }
    let code = params.get("supplierproductcode").cloned().unwrap_or_default();
    let body = state.quotes.lock().unwrap().get(&code).cloned();
    match body {
        Some(body) => Json(body).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown product").into_response(),
    }
}

async fn write_update(State(state): State<Arc<FakePricing>>, Json(body): Json<Value>) -> Response {
    record(&state, "update", body).await
}

async fn write_discount(State(state): State<Arc<FakePricing>>, Json(body): Json<Value>) -> Response {
    record(&state, "discount", body).await
}

async fn record(state: &FakePricing, endpoint: &'static str, body: Value) -> Response {
    if let Some(resp) = pause_or_fail(state).await {
        return resp;
    }
    state.writes.lock().unwrap().push(RecordedWrite { endpoint, body });
    Json(json!({"status": "updated"})).into_response()
}
