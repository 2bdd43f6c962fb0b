//! Pricing gateway: applies increase / decrease / discount requests against
//! upstream, enforcing the cooldown and threshold policy.

use std::sync::Arc;

use tracing::{info, warn};

use super::{
    ChangeKind, Endpoint, MAX_INCREASE_PERCENT, PriceConfirmation, PriceLedger, PriceOperation,
    PriceRejection, PriceUpdate, PricingApi, PricingOutcome, PricingQuote, ProductId,
};
use crate::error::PricingError;
use crate::sync::KeyedMutex;

/// Applies pricing operations. One instance is shared by all pipeline runs.
pub struct PricingGateway {
    api: Arc<dyn PricingApi>,
    ledger: Arc<PriceLedger>,
    /// Serializes check-then-record per product.
    product_locks: KeyedMutex,
}

impl PricingGateway {
    pub fn new(api: Arc<dyn PricingApi>, ledger: Arc<PriceLedger>) -> Self {
        Self {
            api,
            ledger,
            product_locks: KeyedMutex::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<PriceLedger> {
        &self.ledger
    }

    /// Apply `operation` to `product` with the requested price `amount`.
    ///
    /// Increase and decrease share one code path: the direction is decided by
    /// comparing `amount` against upstream's old price, not by the intent.
    pub async fn apply(
        &self,
        operation: PriceOperation,
        product: &ProductId,
        amount: f64,
    ) -> Result<PricingOutcome, PricingError> {
        info!(
            product_id = %product,
            operation = ?operation,
            amount,
            "Applying pricing operation"
        );

        let _guard = self.product_locks.lock(product.as_str()).await;

        let endpoint = operation.endpoint();
        let quote = self.api.fetch_quote(endpoint, product).await?;

        let outcome = match operation {
            PriceOperation::Increase | PriceOperation::Decrease => {
                self.update_price(product, amount, quote).await?
            }
            PriceOperation::Discount => self.discount(product, amount, quote).await?,
        };

        match &outcome {
            PricingOutcome::Applied(c) => info!(
                product_id = %product,
                change = c.change.label(),
                from = c.from,
                to = c.to,
                "Pricing operation applied"
            ),
            PricingOutcome::Rejected(r) => warn!(
                product_id = %product,
                reason = %r.summary(),
                "Pricing operation rejected"
            ),
        }
        Ok(outcome)
    }

    async fn update_price(
        &self,
        product: &ProductId,
        amount: f64,
        quote: PricingQuote,
    ) -> Result<PricingOutcome, PricingError> {
        let new_price = amount - quote.shipping_surcharge;

        let (change, old_price) = if amount > quote.old_price {
            if self.ledger.has_recent_increase(product).await {
                return Ok(PricingOutcome::Rejected(PriceRejection::CooldownActive {
                    product_id: product.clone(),
                }));
            }

            let percent = increase_percent(quote.old_price, amount);
            if percent > MAX_INCREASE_PERCENT {
                return Ok(PricingOutcome::Rejected(PriceRejection::ThresholdExceeded {
                    product_id: product.clone(),
                    percent,
                }));
            }

            // Recorded before the write: the cooldown counts attempts.
            self.ledger.record_increase(product).await;
            (ChangeKind::Increased, amount.max(quote.old_price))
        } else if amount < quote.old_price {
            (ChangeKind::Decreased, amount)
        } else {
            (ChangeKind::Unchanged, quote.old_price)
        };

        let update = PriceUpdate {
            product_id: product.to_string(),
            new_price,
            old_price,
        };
        self.api.submit_price(Endpoint::Update, &update).await?;

        Ok(PricingOutcome::Applied(PriceConfirmation {
            product_id: product.clone(),
            change,
            from: quote.current_price,
            to: new_price,
            old_price,
            shipping_surcharge: quote.shipping_surcharge,
        }))
    }

    async fn discount(
        &self,
        product: &ProductId,
        amount: f64,
        quote: PricingQuote,
    ) -> Result<PricingOutcome, PricingError> {
        if amount > quote.old_price {
            return Ok(PricingOutcome::Rejected(PriceRejection::InvalidDiscount {
                product_id: product.clone(),
                requested: amount,
                old_price: quote.old_price,
            }));
        }

        let new_price = amount - quote.shipping_surcharge;
        let update = PriceUpdate {
            product_id: product.to_string(),
            new_price,
            old_price: quote.old_price,
        };
        self.api.submit_price(Endpoint::Discount, &update).await?;

        Ok(PricingOutcome::Applied(PriceConfirmation {
            product_id: product.clone(),
            change: ChangeKind::Discounted,
            from: quote.current_price,
            to: new_price,
            old_price: quote.old_price,
            shipping_surcharge: quote.shipping_surcharge,
        }))
    }
}

/// Percentage increase from `old` to `new`. Infinite when `old` is zero.
pub fn increase_percent(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return f64::INFINITY;
    }
    (new - old) / old * 100.0
}
