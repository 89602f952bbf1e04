//! The per-user billing facade and the factory that assembles it

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

use crate::charge::ChargeManager;
use crate::checkout::CheckoutBuilder;
use crate::entity::{Billable, UserDirectory};
use crate::gateway::BillingGateway;
use crate::customer::CustomerManager;
use crate::payment_method::PaymentMethodManager;
use crate::store::SubscriptionStore;
use crate::subscription::SubscriptionManager;
use crate::subscription_builder::SubscriptionBuilder;

/// Default ISO currency for one-off charges.
const DEFAULT_CURRENCY: &str = "usd";

/// Assembles a [`BillableUser`] for any [`Billable`] entity.
///
/// Constructed once at process start with explicit handles to the gateway,
/// the subscription store and the host's user directory; managers never
/// reach into a global registry.
pub struct Cashier<S, G, R> {
    gateway: Arc<G>,
    store: Arc<S>,
    users: Arc<R>,
    currency: String,
}

impl<S, G, R> Clone for Cashier<S, G, R> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            users: self.users.clone(),
            currency: self.currency.clone(),
        }
    }
}

impl<S, G, R> Cashier<S, G, R>
where
    S: SubscriptionStore,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn new(gateway: Arc<G>, store: Arc<S>, users: Arc<R>) -> Self {
        Self {
            gateway,
            store,
            users,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Override the currency used for one-off charges.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_lowercase();
        self
    }

    /// Wrap a user entity into its billing facade.
    ///
    /// Each call builds a fresh set of managers bound to this user; the
    /// facade owns the entity for the duration of the request and hands out
    /// guarded access through [`BillableUser::user`].
    pub fn billable<U: Billable>(&self, user: U) -> BillableUser<U, S, G, R> {
        let user = Arc::new(RwLock::new(user));

        let customers = CustomerManager::new(user.clone(), self.gateway.clone(), self.users.clone());
        let payment_methods = PaymentMethodManager::new(customers.clone(), self.gateway.clone());
        let charges = ChargeManager::new(
            customers.clone(),
            payment_methods.clone(),
            self.gateway.clone(),
            self.currency.clone(),
        );
        let subscriptions =
            SubscriptionManager::new(user.clone(), self.store.clone(), self.gateway.clone());

        BillableUser {
            user,
            customers,
            payment_methods,
            charges,
            subscriptions,
            store: self.store.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

/// One user with billing capability: the unified interface over the five
/// managers plus access to the wrapped entity itself.
pub struct BillableUser<U, S, G, R> {
    user: Arc<RwLock<U>>,
    customers: CustomerManager<U, G, R>,
    payment_methods: PaymentMethodManager<U, G, R>,
    charges: ChargeManager<U, G, R>,
    subscriptions: SubscriptionManager<U, S, G>,
    store: Arc<S>,
    gateway: Arc<G>,
}

impl<U, S, G, R> BillableUser<U, S, G, R>
where
    U: Billable,
    S: SubscriptionStore,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn customer(&self) -> &CustomerManager<U, G, R> {
        &self.customers
    }

    pub fn payment_method(&self) -> &PaymentMethodManager<U, G, R> {
        &self.payment_methods
    }

    pub fn charge(&self) -> &ChargeManager<U, G, R> {
        &self.charges
    }

    pub fn subscription(&self) -> &SubscriptionManager<U, S, G> {
        &self.subscriptions
    }

    /// A fresh subscription builder bound to this user.
    pub fn subscribe(&self) -> SubscriptionBuilder<U, S, G, R> {
        SubscriptionBuilder::new(
            self.customers.clone(),
            self.payment_methods.clone(),
            self.store.clone(),
            self.gateway.clone(),
        )
    }

    /// A fresh checkout-session builder bound to this user.
    pub async fn checkout(&self) -> CheckoutBuilder<G> {
        let customer_id = self
            .user
            .read()
            .await
            .remote_customer_id()
            .filter(|id| !id.is_empty());
        CheckoutBuilder::new(self.gateway.clone(), customer_id)
    }

    /// Read access to the wrapped user entity.
    pub async fn user(&self) -> RwLockReadGuard<'_, U> {
        self.user.read().await
    }

    /// Run a closure with mutable access to the wrapped user entity.
    pub async fn update_user<T>(&self, f: impl FnOnce(&mut U) -> T) -> T {
        let mut user = self.user.write().await;
        f(&mut user)
    }
}
