//! Stripe customer management for a billable user

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::entity::{Billable, UserDirectory};
use crate::error::{CashierError, CashierResult};
use crate::gateway::{BillingGateway, CustomerDraft, RemoteCustomer};

/// Owns the mapping between a local user entity and its Stripe customer.
///
/// The remote customer is created lazily: nothing is sent to Stripe until
/// [`CustomerManager::create_remote_customer`] runs.
pub struct CustomerManager<U, G, R> {
    user: Arc<RwLock<U>>,
    gateway: Arc<G>,
    users: Arc<R>,
}

impl<U, G, R> Clone for CustomerManager<U, G, R> {
    fn clone(&self) -> Self {
        Self {
            user: self.user.clone(),
            gateway: self.gateway.clone(),
            users: self.users.clone(),
        }
    }
}

impl<U, G, R> CustomerManager<U, G, R>
where
    U: Billable,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn new(user: Arc<RwLock<U>>, gateway: Arc<G>, users: Arc<R>) -> Self {
        Self { user, gateway, users }
    }

    /// The Stripe customer id stored on the entity, if any.
    pub async fn remote_id(&self) -> Option<String> {
        self.user
            .read()
            .await
            .remote_customer_id()
            .filter(|id| !id.is_empty())
    }

    pub async fn has_remote_id(&self) -> bool {
        self.remote_id().await.is_some()
    }

    /// Create a Stripe customer for the entity if it does not have one yet
    /// and return its id.
    ///
    /// Entity fields fill in whatever the draft leaves unset; explicit draft
    /// values always win. The assigned id is written back onto the entity
    /// and persisted through the [`UserDirectory`]. Idempotent: an entity
    /// that already has a remote id is returned unchanged without a gateway
    /// call.
    pub async fn create_remote_customer(&self, mut draft: CustomerDraft) -> CashierResult<String> {
        {
            let user = self.user.read().await;
            if let Some(id) = user.remote_customer_id().filter(|id| !id.is_empty()) {
                return Ok(id);
            }

            if draft.name.is_none() {
                draft.name = user.display_name();
            }
            if draft.email.is_none() {
                draft.email = user.email();
            }
            if draft.phone.is_none() {
                draft.phone = user.phone();
            }
            if draft.preferred_locales.is_none() {
                draft.preferred_locales = user.preferred_locales();
            }
        }

        let customer = self.gateway.create_customer(draft).await?;

        let billing_key = {
            let mut user = self.user.write().await;
            user.set_remote_customer_id(Some(customer.id.clone()));
            user.billing_key()
        };
        self.users
            .persist_remote_customer_id(&billing_key, &customer.id)
            .await?;

        tracing::info!(
            billing_key = %billing_key,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id)
    }

    /// Retrieve the full Stripe customer, or `None` if the entity has no
    /// remote id.
    pub async fn fetch_remote_customer(&self) -> CashierResult<Option<RemoteCustomer>> {
        match self.remote_id().await {
            Some(id) => Ok(Some(self.gateway.retrieve_customer(&id).await?)),
            None => Ok(None),
        }
    }

    /// Create the Stripe customer if needed, then retrieve it.
    pub async fn create_or_fetch_remote_customer(
        &self,
        draft: CustomerDraft,
    ) -> CashierResult<RemoteCustomer> {
        if !self.has_remote_id().await {
            self.create_remote_customer(draft).await?;
        }

        self.fetch_remote_customer().await?.ok_or_else(|| {
            CashierError::Precondition("user has no Stripe customer".to_string())
        })
    }
}
