//! Price mutation: quotes, policy, cooldown ledger and the upstream client.
//!
//! Flow for a single request:
//! 1. `PricingApi::fetch_quote()`: current / old price and shipping surcharge
//! 2. Policy: cooldown (via `PriceLedger`) and the 10% increase threshold
//! 3. `PricingApi::submit_price()`: write the new price pair
//!
//! Policy rejections are ordinary outcomes, not errors.

pub mod client;
pub mod gateway;
pub mod ledger;

pub use client::{HttpPricingApi, PricingApi};
pub use gateway::PricingGateway;
pub use ledger::{JsonFileLedgerStore, LedgerStore, PriceLedger};

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Days a product must wait between two accepted price increases.
pub const COOLDOWN_DAYS: i64 = 7;

/// Largest single-step increase allowed, in percent of the previous price.
pub const MAX_INCREASE_PERCENT: f64 = 10.0;

// ── Product id ──────────────────────────────────────────────────────

/// Canonical (trimmed, uppercase) supplier product code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Canonicalize a raw product code. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = canonicalize(raw);
        (!canonical.is_empty()).then_some(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom("empty product id"))
    }
}

/// Uppercase + trim. Idempotent.
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ── Requests ────────────────────────────────────────────────────────

/// The three supported pricing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceOperation {
    Increase,
    Decrease,
    Discount,
}

/// Which upstream deployment an operation talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Increase / decrease.
    Update,
    Discount,
}

impl PriceOperation {
    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::Increase | Self::Decrease => Endpoint::Update,
            Self::Discount => Endpoint::Discount,
        }
    }
}

/// Prices read from upstream for one product. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PricingQuote {
    pub current_price: f64,
    pub old_price: f64,
    pub shipping_surcharge: f64,
}

/// Body of a price write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    #[serde(rename = "supplierproductcode")]
    pub product_id: String,
    pub new_price: f64,
    pub old_price: f64,
}

// ── Outcomes ────────────────────────────────────────────────────────

/// How the listed price moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Increased,
    Decreased,
    Unchanged,
    Discounted,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Unchanged => "unchanged",
            Self::Discounted => "discounted",
        }
    }
}

/// A write that upstream accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceConfirmation {
    pub product_id: ProductId,
    pub change: ChangeKind,
    /// Price shown before the change.
    pub from: f64,
    /// Price submitted (requested amount minus shipping surcharge).
    pub to: f64,
    pub old_price: f64,
    pub shipping_surcharge: f64,
}

impl PriceConfirmation {
    /// One-line description for the user / text generator.
    pub fn summary(&self) -> String {
        match self.change {
            ChangeKind::Discounted => format!(
                "Discount applied for product `{}`. Price changed from {} to {} with additional shipping charges {}.",
                self.product_id, self.old_price, self.to, self.shipping_surcharge
            ),
            change => format!(
                "Price for product `{}` will be {} from {} to {} soon.",
                self.product_id,
                change.label(),
                self.from,
                self.to
            ),
        }
    }
}

/// Policy rejection. Returned as a normal outcome; nothing is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PriceRejection {
    /// An increase was already accepted within the cooldown window.
    CooldownActive { product_id: ProductId },
    /// The increase exceeds `MAX_INCREASE_PERCENT`.
    ThresholdExceeded { product_id: ProductId, percent: f64 },
    /// Discounted price above the old price.
    InvalidDiscount {
        product_id: ProductId,
        requested: f64,
        old_price: f64,
    },
}

impl PriceRejection {
    pub fn product_id(&self) -> &ProductId {
        match self {
            Self::CooldownActive { product_id }
            | Self::ThresholdExceeded { product_id, .. }
            | Self::InvalidDiscount { product_id, .. } => product_id,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::CooldownActive { product_id } => format!(
                "Price increase for product `{product_id}` was attempted within the last week. \
                 Please wait {COOLDOWN_DAYS} days before increasing the price again."
            ),
            Self::ThresholdExceeded {
                product_id,
                percent,
            } if percent.is_finite() => format!(
                "Price increase of {percent:.2}% exceeds {MAX_INCREASE_PERCENT}% threshold. \
                 Update rejected for product `{product_id}`."
            ),
            Self::ThresholdExceeded { product_id, .. } => format!(
                "Previous price for product `{product_id}` is unknown, so the increase cannot be \
                 checked against the {MAX_INCREASE_PERCENT}% threshold. Update rejected."
            ),
            Self::InvalidDiscount { product_id, .. } => format!(
                "Discounted price cannot exceed old price. Update rejected for product `{product_id}`."
            ),
        }
    }
}

/// Result of a pricing operation that reached upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PricingOutcome {
    Applied(PriceConfirmation),
    Rejected(PriceRejection),
}

impl PricingOutcome {
    pub fn product_id(&self) -> &ProductId {
        match self {
            Self::Applied(c) => &c.product_id,
            Self::Rejected(r) => r.product_id(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Applied(c) => c.summary(),
            Self::Rejected(r) => r.summary(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}
