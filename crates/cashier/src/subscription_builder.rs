//! Multi-step creation of a new subscription and its local mirror record

use std::collections::HashMap;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::entity::{Billable, UserDirectory};
use crate::error::{CashierError, CashierResult};
use crate::gateway::{BillingGateway, CustomerDraft, RemoteSubscription, SubscriptionDraft};
use crate::customer::CustomerManager;
use crate::payment_method::PaymentMethodManager;
use crate::store::{SubscriptionRecord, SubscriptionStore, DEFAULT_SUBSCRIPTION_TYPE};

/// Builds one new subscription; a fresh value is constructed per request
/// and never shared.
///
/// The price id is required before [`SubscriptionBuilder::start`] runs; a
/// trial window is optional.
pub struct SubscriptionBuilder<U, S, G, R> {
    customers: CustomerManager<U, G, R>,
    payment_methods: PaymentMethodManager<U, G, R>,
    store: Arc<S>,
    gateway: Arc<G>,
    price_id: Option<String>,
    trial_expires: Option<OffsetDateTime>,
}

impl<U, S, G, R> SubscriptionBuilder<U, S, G, R>
where
    U: Billable,
    S: SubscriptionStore,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn new(
        customers: CustomerManager<U, G, R>,
        payment_methods: PaymentMethodManager<U, G, R>,
        store: Arc<S>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            customers,
            payment_methods,
            store,
            gateway,
            price_id: None,
            trial_expires: None,
        }
    }

    /// The Stripe price the subscription is created at.
    pub fn price(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    /// Start the trial `days` days from now; must be at least one day.
    pub fn trial_days(mut self, days: u32) -> CashierResult<Self> {
        if days < 1 {
            return Err(CashierError::InvalidArgument(
                "trial days must be greater than zero".to_string(),
            ));
        }

        self.trial_expires = Some(OffsetDateTime::now_utc() + Duration::days(i64::from(days)));
        Ok(self)
    }

    /// End the trial at an explicit instant; must be in the future.
    pub fn trial_until(mut self, instant: OffsetDateTime) -> CashierResult<Self> {
        if instant <= OffsetDateTime::now_utc() {
            return Err(CashierError::InvalidArgument(
                "trial expiration date must be in the future".to_string(),
            ));
        }

        self.trial_expires = Some(instant);
        Ok(self)
    }

    /// Create the remote subscription and persist its local mirror record.
    ///
    /// Requires a resolvable Stripe customer. The payment method is the
    /// explicit one when given, otherwise the customer's default. `options`
    /// are forwarded as subscription metadata. The local record is upserted
    /// on the `(customer id, type)` pair.
    pub async fn start(
        &self,
        options: HashMap<String, String>,
        payment_method_id: Option<&str>,
        type_: Option<&str>,
    ) -> CashierResult<RemoteSubscription> {
        let customer = self.customers.fetch_remote_customer().await?.ok_or_else(|| {
            CashierError::Precondition("user has no Stripe customer".to_string())
        })?;

        let type_ = match type_ {
            Some(type_) if !type_.is_empty() => type_,
            _ => DEFAULT_SUBSCRIPTION_TYPE,
        };

        let price_id = self
            .price_id
            .as_deref()
            .ok_or_else(|| CashierError::InvalidArgument("price id is required".to_string()))?;

        let method_id = match payment_method_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .payment_methods
                .default_payment_method()
                .await?
                .map(|method| method.id)
                .ok_or_else(|| {
                    CashierError::InvalidArgument("payment method is required".to_string())
                })?,
        };

        let draft = SubscriptionDraft {
            customer: customer.id.clone(),
            default_payment_method: method_id,
            price: price_id.to_string(),
            quantity: 1,
            trial_end: self.trial_expires.map(OffsetDateTime::unix_timestamp),
            metadata: options,
        };

        let subscription = self.gateway.create_subscription(draft).await?;
        self.save_subscription(&customer.id, type_, &subscription).await?;

        tracing::info!(
            customer_id = %customer.id,
            subscription_id = %subscription.id,
            price_id = %price_id,
            subscription_type = %type_,
            "Started subscription"
        );

        Ok(subscription)
    }

    /// Ensure the Stripe customer exists, attach the given payment method,
    /// then start the subscription with it.
    pub async fn start_with_new_customer(
        &self,
        customer_draft: CustomerDraft,
        options: HashMap<String, String>,
        payment_method_id: &str,
        type_: Option<&str>,
    ) -> CashierResult<RemoteSubscription> {
        self.customers.create_or_fetch_remote_customer(customer_draft).await?;

        if payment_method_id.is_empty() {
            return Err(CashierError::InvalidArgument(
                "payment method is required".to_string(),
            ));
        }

        let method = self.payment_methods.add_payment_method(payment_method_id).await?;

        self.start(options, Some(&method.id), type_).await
    }

    async fn save_subscription(
        &self,
        user_id: &str,
        type_: &str,
        subscription: &RemoteSubscription,
    ) -> CashierResult<()> {
        let now = OffsetDateTime::now_utc();
        let record = SubscriptionRecord {
            id: 0,
            user_id: user_id.to_string(),
            type_: type_.to_string(),
            stripe_id: subscription.id.clone(),
            stripe_status: subscription.status.clone(),
            stripe_price: subscription.items.first().and_then(|item| item.price.clone()),
            quantity: subscription
                .items
                .first()
                .and_then(|item| item.quantity)
                .map(|quantity| quantity as i64),
            trial_ends_at: None,
            ends_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.store.find_by_user_and_type(user_id, type_).await? {
            Some(existing) => {
                let mut record = record;
                record.id = existing.id;
                record.created_at = existing.created_at;
                self.store.update(record).await?;
            }
            None => {
                self.store.insert(record).await?;
            }
        }

        Ok(())
    }
}
