//! Subscription lifecycle queries and mutations

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::entity::Billable;
use crate::error::{CashierError, CashierResult};
use crate::gateway::{
    BillingGateway, RemoteSubscription, SubscriptionChange, SubscriptionItemChange,
};
use crate::store::{
    SubscriptionRecord, SubscriptionState, SubscriptionStore, DEFAULT_SUBSCRIPTION_TYPE,
};

fn datetime_from_epoch(epoch: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(epoch).unwrap_or(OffsetDateTime::now_utc())
}

/// Owns the recurring-subscription lifecycle for one billable user.
///
/// The local record is the source of truth for every predicate; the gateway
/// is only consulted by the mutating operations. Records are keyed by the
/// user's Stripe customer id and a subscription type; `None` defaults the
/// type to `"default"`.
pub struct SubscriptionManager<U, S, G> {
    user: Arc<RwLock<U>>,
    store: Arc<S>,
    gateway: Arc<G>,
}

impl<U, S, G> Clone for SubscriptionManager<U, S, G> {
    fn clone(&self) -> Self {
        Self {
            user: self.user.clone(),
            store: self.store.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<U, S, G> SubscriptionManager<U, S, G>
where
    U: Billable,
    S: SubscriptionStore,
    G: BillingGateway,
{
    pub fn new(user: Arc<RwLock<U>>, store: Arc<S>, gateway: Arc<G>) -> Self {
        Self { user, store, gateway }
    }

    async fn record_for(&self, type_: &str) -> CashierResult<SubscriptionRecord> {
        if type_.is_empty() {
            return Err(CashierError::InvalidArgument(
                "subscription type is required".to_string(),
            ));
        }

        let user_id = self
            .user
            .read()
            .await
            .remote_customer_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CashierError::NotFound("user has no Stripe customer, so no subscription".to_string())
            })?;

        self.store
            .find_by_user_and_type(&user_id, type_)
            .await?
            .ok_or_else(|| {
                CashierError::NotFound(format!(
                    "no {type_} subscription for customer {user_id}"
                ))
            })
    }

    /// All locally recorded subscriptions for the user.
    pub async fn all(&self) -> CashierResult<Vec<SubscriptionRecord>> {
        let Some(user_id) = self.user.read().await.remote_customer_id() else {
            return Ok(Vec::new());
        };
        self.store.find_by_user(&user_id).await
    }

    /// The local record for the given type.
    pub async fn record(&self, type_: Option<&str>) -> CashierResult<SubscriptionRecord> {
        self.record_for(type_.unwrap_or(DEFAULT_SUBSCRIPTION_TYPE)).await
    }

    /// Request cancellation at the end of the current billing period.
    ///
    /// Mirrors the remote period end into the local record's `ends_at`,
    /// which puts the subscription on its grace period.
    pub async fn cancel_at_period_end(
        &self,
        type_: Option<&str>,
    ) -> CashierResult<RemoteSubscription> {
        let record = self.record(type_).await?;

        let updated = self
            .gateway
            .update_subscription(
                &record.stripe_id,
                SubscriptionChange {
                    cancel_at_period_end: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let ends_at = updated.current_period_end.map(datetime_from_epoch);
        self.store.update_ends_at(record.id, ends_at).await?;

        tracing::info!(
            subscription_id = %updated.id,
            ends_at = ?ends_at,
            "Cancelled subscription at period end"
        );

        Ok(updated)
    }

    /// Replace the subscription's line item with one at `new_price`.
    ///
    /// The update invoices the proration immediately and clears any pending
    /// cancellation. Old line items whose price differs are deleted from
    /// the remote subscription afterwards; the local record is updated with
    /// the new price, quantity, status and a recomputed `ends_at`.
    pub async fn swap_item_subscription(
        &self,
        type_: Option<&str>,
        new_price: &str,
    ) -> CashierResult<RemoteSubscription> {
        if new_price.is_empty() {
            return Err(CashierError::InvalidArgument("price id is required".to_string()));
        }

        let record = self.record(type_).await?;
        let current = self.gateway.retrieve_subscription(&record.stripe_id).await?;
        let quantity = record.quantity.unwrap_or(1).max(1) as u64;

        let updated = self
            .gateway
            .update_subscription(
                &record.stripe_id,
                SubscriptionChange {
                    item: Some(SubscriptionItemChange {
                        price: new_price.to_string(),
                        quantity,
                    }),
                    cancel_at_period_end: Some(false),
                    always_invoice: true,
                },
            )
            .await?;

        // Orphaned line items at the old price are removed, not kept around.
        for item in &current.items {
            if item.price.as_deref() != Some(new_price) {
                self.gateway.delete_subscription_item(&item.id).await?;
            }
        }

        let new_item = updated
            .items
            .iter()
            .find(|item| item.price.as_deref() == Some(new_price));

        let mut record = record;
        record.stripe_id = updated.id.clone();
        record.stripe_status = updated.status.clone();
        record.stripe_price = Some(new_price.to_string());
        record.quantity = new_item
            .and_then(|item| item.quantity)
            .map(|quantity| quantity as i64)
            .or(record.quantity);
        record.ends_at = updated
            .cancel_at
            .or(updated.current_period_end)
            .map(datetime_from_epoch);
        self.store.update(record).await?;

        tracing::info!(
            subscription_id = %updated.id,
            new_price = %new_price,
            "Swapped subscription item"
        );

        Ok(updated)
    }

    /// Whether a cancellation has been requested for the subscription.
    pub async fn is_canceled(&self, type_: Option<&str>) -> CashierResult<bool> {
        Ok(self.record(type_).await?.is_canceled())
    }

    /// Whether the subscription is inside its trial window.
    pub async fn on_trial(&self, type_: Option<&str>) -> CashierResult<bool> {
        Ok(self.record(type_).await?.on_trial())
    }

    /// Whether a cancelled subscription is still inside its paid period.
    pub async fn on_grace_period(&self, type_: Option<&str>) -> CashierResult<bool> {
        Ok(self.record(type_).await?.on_grace_period())
    }

    /// Whether the subscription is cancelled and past its grace period.
    pub async fn ended(&self, type_: Option<&str>) -> CashierResult<bool> {
        Ok(self.record(type_).await?.has_ended())
    }

    /// Derived lifecycle state of the subscription.
    pub async fn state(&self, type_: Option<&str>) -> CashierResult<SubscriptionState> {
        Ok(self.record(type_).await?.state())
    }
}
