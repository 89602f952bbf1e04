//! Hosted checkout sessions

use std::sync::Arc;

use crate::error::{CashierError, CashierResult};
use crate::gateway::{BillingGateway, CheckoutDraft};

/// Builds one hosted checkout session for a single product purchase.
///
/// A fresh builder is constructed per call; request state never lives in a
/// shared instance.
pub struct CheckoutBuilder<G> {
    gateway: Arc<G>,
    customer_id: Option<String>,
    price_id: Option<String>,
    quantity: u64,
    success_url: Option<String>,
    cancel_url: Option<String>,
}

impl<G: BillingGateway> CheckoutBuilder<G> {
    pub(crate) fn new(gateway: Arc<G>, customer_id: Option<String>) -> Self {
        Self {
            gateway,
            customer_id,
            price_id: None,
            quantity: 1,
            success_url: None,
            cancel_url: None,
        }
    }

    pub fn price(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    pub fn quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }

    /// URL the buyer is redirected to after a successful payment.
    pub fn success_url(mut self, url: impl Into<String>) -> Self {
        self.success_url = Some(url.into());
        self
    }

    /// URL the buyer is redirected to when the payment is cancelled.
    pub fn cancel_url(mut self, url: impl Into<String>) -> Self {
        self.cancel_url = Some(url.into());
        self
    }

    /// Create the payment-mode checkout session and return its hosted URL.
    pub async fn complete(self) -> CashierResult<String> {
        let price = self
            .price_id
            .ok_or_else(|| CashierError::InvalidArgument("price id is required".to_string()))?;
        let success_url = self
            .success_url
            .ok_or_else(|| CashierError::InvalidArgument("success URL is required".to_string()))?;
        let cancel_url = self
            .cancel_url
            .ok_or_else(|| CashierError::InvalidArgument("cancel URL is required".to_string()))?;

        let session = self
            .gateway
            .create_checkout_session(CheckoutDraft {
                customer: self.customer_id,
                price,
                quantity: self.quantity,
                success_url,
                cancel_url,
            })
            .await?;

        tracing::info!(session_id = %session.id, "Created checkout session");

        session.url.ok_or_else(|| {
            CashierError::remote("checkout.session.create", "session has no hosted URL")
        })
    }
}
