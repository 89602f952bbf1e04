//! One-off charges and refunds

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{Billable, UserDirectory};
use crate::error::{CashierError, CashierResult};
use crate::gateway::{
    BillingGateway, PaymentIntentDraft, PaymentIntentState, RefundDraft, RemotePaymentIntent,
    RemoteRefund,
};
use crate::customer::CustomerManager;
use crate::payment_method::PaymentMethodManager;

/// Caller-supplied settings for a one-off charge. Values set here win over
/// the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct ChargeOptions {
    /// Override of the configured charge currency.
    pub currency: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefundOptions {
    /// Partial refund amount in the smallest currency unit; full refund
    /// when unset.
    pub amount: Option<i64>,
    pub metadata: HashMap<String, String>,
}

/// Performs one-off charge and refund operations for a billable user.
pub struct ChargeManager<U, G, R> {
    customers: CustomerManager<U, G, R>,
    payment_methods: PaymentMethodManager<U, G, R>,
    gateway: Arc<G>,
    currency: String,
}

impl<U, G, R> Clone for ChargeManager<U, G, R> {
    fn clone(&self) -> Self {
        Self {
            customers: self.customers.clone(),
            payment_methods: self.payment_methods.clone(),
            gateway: self.gateway.clone(),
            currency: self.currency.clone(),
        }
    }
}

impl<U, G, R> ChargeManager<U, G, R>
where
    U: Billable,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn new(
        customers: CustomerManager<U, G, R>,
        payment_methods: PaymentMethodManager<U, G, R>,
        gateway: Arc<G>,
        currency: String,
    ) -> Self {
        Self {
            customers,
            payment_methods,
            gateway,
            currency,
        }
    }

    /// Charge the user `amount` (a decimal currency value, e.g. `14.99`).
    ///
    /// The charge goes to the explicit payment method when one is given,
    /// otherwise to the customer's default. The intent is created and
    /// confirmed in a single synchronous call with redirect-based methods
    /// disabled; an intent that comes back still requiring action or
    /// confirmation fails validation instead of being silently retried.
    pub async fn charge(
        &self,
        amount: f64,
        payment_method_id: Option<&str>,
        options: ChargeOptions,
    ) -> CashierResult<RemotePaymentIntent> {
        let method_id = match payment_method_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .payment_methods
                .default_payment_method()
                .await?
                .map(|method| method.id)
                .ok_or_else(|| {
                    CashierError::Precondition("no default payment method".to_string())
                })?,
        };

        let draft = PaymentIntentDraft {
            amount: (amount * 100.0).round() as i64,
            currency: options.currency.unwrap_or_else(|| self.currency.clone()),
            payment_method: method_id,
            customer: self.customers.remote_id().await,
            description: options.description,
            metadata: options.metadata,
        };

        let intent = self.gateway.create_payment_intent(draft).await?;
        Self::validate(&intent)?;

        tracing::info!(
            payment_intent_id = %intent.id,
            amount = intent.amount,
            currency = %intent.currency,
            "Charged payment intent"
        );

        Ok(intent)
    }

    /// Refund a previously confirmed payment intent.
    pub async fn refund(
        &self,
        payment_intent_id: &str,
        options: RefundOptions,
    ) -> CashierResult<RemoteRefund> {
        let draft = RefundDraft {
            payment_intent: payment_intent_id.to_string(),
            amount: options.amount,
            metadata: options.metadata,
        };

        let refund = self.gateway.create_refund(draft).await?;

        tracing::info!(
            refund_id = %refund.id,
            payment_intent_id = %payment_intent_id,
            "Created refund"
        );

        Ok(refund)
    }

    fn validate(intent: &RemotePaymentIntent) -> CashierResult<()> {
        if intent.payment_method.is_none() {
            return Err(CashierError::PaymentValidation(
                "confirmed intent has no payment method".to_string(),
            ));
        }

        match intent.status {
            PaymentIntentState::RequiresAction => Err(CashierError::PaymentValidation(
                "payment requires additional customer action".to_string(),
            )),
            PaymentIntentState::RequiresConfirmation => Err(CashierError::PaymentValidation(
                "payment was not confirmed synchronously".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
