//! HTTP client for the external pricing service.
//!
//! Read: `GET {url}?supplierproductcode=ID` →
//! `{"update_price": .., "update_oldPrice": .., "update_additionalshippingcharges": ..}`
//!
//! Write: `POST {url}` with `{"supplierproductcode", "new_price", "old_price"}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Endpoint, PriceUpdate, PricingQuote, ProductId};
use crate::config::PricingSettings;
use crate::error::PricingError;

/// Upstream pricing API, behind a trait so the gateway can be tested offline.
#[async_trait]
pub trait PricingApi: Send + Sync {
    /// Read the current quote for `product`.
    async fn fetch_quote(
        &self,
        endpoint: Endpoint,
        product: &ProductId,
    ) -> Result<PricingQuote, PricingError>;

    /// Submit a new price pair.
    async fn submit_price(&self, endpoint: Endpoint, update: &PriceUpdate)
    -> Result<(), PricingError>;
}

/// reqwest-backed `PricingApi`.
pub struct HttpPricingApi {
    client: reqwest::Client,
    update_url: String,
    discount_url: String,
}

impl HttpPricingApi {
    pub fn new(settings: &PricingSettings) -> Result<Self, PricingError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PricingError::UpstreamUnavailable {
                product_id: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            update_url: settings.update_url.clone(),
            discount_url: settings.discount_url.clone(),
        })
    }

    /// Convenience constructor with a single URL for both endpoints.
    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, PricingError> {
        let url = url.into();
        Self::new(&PricingSettings {
            update_url: url.clone(),
            discount_url: url,
            timeout,
        })
    }

    fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Update => &self.update_url,
            Endpoint::Discount => &self.discount_url,
        }
    }
}

#[async_trait]
impl PricingApi for HttpPricingApi {
    async fn fetch_quote(
        &self,
        endpoint: Endpoint,
        product: &ProductId,
    ) -> Result<PricingQuote, PricingError> {
        let unavailable = |reason: String| PricingError::UpstreamUnavailable {
            product_id: product.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(self.url(endpoint))
            .query(&[("supplierproductcode", product.as_str())])
            .send()
            .await
            .map_err(|e| unavailable(describe(&e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| unavailable(describe(&e)))?;
        debug!(product_id = %product, status = %status, body = %body, "Pricing quote response");

        if !status.is_success() {
            return Err(unavailable(format!(
                "failed to retrieve current price (status {status}): {body}"
            )));
        }

        let raw: RawQuote = serde_json::from_str(&body)
            .map_err(|e| unavailable(format!("invalid quote body: {e}")))?;
        let quote = raw.into_quote();

        info!(
            product_id = %product,
            current_price = quote.current_price,
            old_price = quote.old_price,
            shipping = quote.shipping_surcharge,
            "Retrieved pricing quote"
        );
        Ok(quote)
    }

    async fn submit_price(
        &self,
        endpoint: Endpoint,
        update: &PriceUpdate,
    ) -> Result<(), PricingError> {
        let unavailable = |reason: String| PricingError::UpstreamUnavailable {
            product_id: update.product_id.clone(),
            reason,
        };

        info!(
            product_id = %update.product_id,
            new_price = update.new_price,
            old_price = update.old_price,
            "Submitting price update"
        );

        let resp = self
            .client
            .post(self.url(endpoint))
            .json(update)
            .send()
            .await
            .map_err(|e| unavailable(describe(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(product_id = %update.product_id, status = %status, body = %body, "Price update rejected upstream");
            return Err(unavailable(format!(
                "failed to update price (status {status}): {body}"
            )));
        }
        Ok(())
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else {
        e.to_string()
    }
}

/// Upstream quote body. Fields may be numbers, numeric strings, or absent.
#[derive(Debug, Default, Deserialize)]
struct RawQuote {
    #[serde(default, rename = "update_price")]
    price: Option<serde_json::Value>,
    #[serde(default, rename = "update_oldPrice")]
    old_price: Option<serde_json::Value>,
    #[serde(default, rename = "update_additionalshippingcharges")]
    shipping: Option<serde_json::Value>,
}

impl RawQuote {
    fn into_quote(self) -> PricingQuote {
        PricingQuote {
            current_price: numeric(self.price.as_ref()),
            old_price: numeric(self.old_price.as_ref()),
            shipping_surcharge: numeric(self.shipping.as_ref()),
        }
    }
}

fn numeric(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
