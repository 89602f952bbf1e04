//! The remote billing gateway the managers talk to
//!
//! Stripe is consumed through this trait so the managers never depend on
//! the SDK directly. The production implementation backed by async-stripe
//! lives in [`crate::client`]; an in-memory double for tests lives in
//! [`crate::testing`].

use std::collections::HashMap;

use serde::Serialize;

use crate::error::CashierResult;

/// Fields sent when creating a Stripe customer.
///
/// Unset fields are filled in from the [`crate::entity::Billable`] entity;
/// values set here always win over entity defaults.
#[derive(Debug, Clone, Default)]
pub struct CustomerDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferred_locales: Option<Vec<String>>,
    pub metadata: HashMap<String, String>,
}

/// The slice of a Stripe customer the crate reads.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteCustomer {
    pub id: String,
    /// Payment method id from the customer's invoice settings, if set.
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemotePaymentMethod {
    pub id: String,
    /// Customer the method is attached to, if any.
    pub customer: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

/// Outcome states of a confirmed payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentState {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresConfirmation,
    RequiresPaymentMethod,
    RequiresCapture,
    Canceled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemotePaymentIntent {
    pub id: String,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentState,
    pub payment_method: Option<String>,
    pub client_secret: Option<String>,
}

/// A charge submitted as a create-and-confirm payment intent.
///
/// The gateway always confirms synchronously and disables redirect-based
/// payment methods for these drafts.
#[derive(Debug, Clone)]
pub struct PaymentIntentDraft {
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
    pub customer: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RefundDraft {
    pub payment_intent: String,
    /// Partial refund amount in the smallest currency unit; full refund
    /// when unset.
    pub amount: Option<i64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteRefund {
    pub id: String,
    pub payment_intent: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionDraft {
    pub customer: String,
    pub default_payment_method: String,
    pub price: String,
    pub quantity: u64,
    /// Trial end as epoch seconds, forwarded verbatim to Stripe.
    pub trial_end: Option<i64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteSubscriptionItem {
    pub id: String,
    pub price: Option<String>,
    pub quantity: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    /// Epoch seconds at which the subscription is scheduled to cancel.
    pub cancel_at: Option<i64>,
    /// End of the current billing period as epoch seconds.
    pub current_period_end: Option<i64>,
    pub items: Vec<RemoteSubscriptionItem>,
}

/// Replacement line item for a subscription update.
#[derive(Debug, Clone)]
pub struct SubscriptionItemChange {
    pub price: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionChange {
    pub item: Option<SubscriptionItemChange>,
    pub cancel_at_period_end: Option<bool>,
    /// Invoice the proration immediately instead of folding it into the
    /// next invoice.
    pub always_invoice: bool,
}

#[derive(Debug, Clone)]
pub struct CheckoutDraft {
    pub customer: Option<String>,
    pub price: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Stripe operations the managers depend on.
///
/// Every method maps to a single provider call; failures surface as
/// [`crate::error::CashierError::RemoteApi`] carrying the operation name.
#[allow(async_fn_in_trait)]
pub trait BillingGateway: Send + Sync {
    async fn create_customer(&self, draft: CustomerDraft) -> CashierResult<RemoteCustomer>;

    async fn retrieve_customer(&self, customer_id: &str) -> CashierResult<RemoteCustomer>;

    /// Retrieve the customer with the default payment method expanded into
    /// a full resource.
    async fn retrieve_customer_expanded(
        &self,
        customer_id: &str,
    ) -> CashierResult<(RemoteCustomer, Option<RemotePaymentMethod>)>;

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> CashierResult<()>;

    /// Create a setup intent scoped to the customer and return its client
    /// secret.
    async fn create_setup_intent(&self, customer_id: &str) -> CashierResult<String>;

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod>;

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> CashierResult<RemotePaymentMethod>;

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod>;

    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> CashierResult<Vec<RemotePaymentMethod>>;

    /// Create and synchronously confirm a payment intent.
    async fn create_payment_intent(
        &self,
        draft: PaymentIntentDraft,
    ) -> CashierResult<RemotePaymentIntent>;

    async fn create_refund(&self, draft: RefundDraft) -> CashierResult<RemoteRefund>;

    /// Create a subscription with a single line item, expanding the latest
    /// invoice's payment intent and allowing no promotion code.
    async fn create_subscription(
        &self,
        draft: SubscriptionDraft,
    ) -> CashierResult<RemoteSubscription>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> CashierResult<RemoteSubscription>;

    async fn update_subscription(
        &self,
        subscription_id: &str,
        change: SubscriptionChange,
    ) -> CashierResult<RemoteSubscription>;

    async fn delete_subscription_item(&self, item_id: &str) -> CashierResult<()>;

    async fn create_checkout_session(
        &self,
        draft: CheckoutDraft,
    ) -> CashierResult<RemoteCheckoutSession>;
}
