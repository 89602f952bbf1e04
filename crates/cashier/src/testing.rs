//! In-memory doubles for tests and local development
//!
//! [`MockGateway`] stands in for Stripe, tracking attached payment methods,
//! default-method pointers and subscription line items so tests can assert
//! on the remote side without network access. [`InMemorySubscriptionStore`]
//! and [`InMemoryUserDirectory`] replace the host's persistence.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use time::OffsetDateTime;

use crate::entity::{Billable, UserDirectory};
use crate::error::{CashierError, CashierResult};
use crate::gateway::{
    BillingGateway, CheckoutDraft, CustomerDraft, PaymentIntentDraft, PaymentIntentState,
    RefundDraft, RemoteCheckoutSession, RemoteCustomer, RemotePaymentIntent, RemotePaymentMethod,
    RemoteRefund, RemoteSubscription, RemoteSubscriptionItem, SubscriptionChange, SubscriptionDraft,
};
use crate::store::{SubscriptionRecord, SubscriptionStore};

/// Scripted outcome for the next confirmed payment intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum IntentOutcome {
    #[default]
    Succeed,
    RequiresAction,
    MissingPaymentMethod,
}

#[derive(Default)]
struct MockCustomer {
    name: Option<String>,
    email: Option<String>,
    default_payment_method: Option<String>,
}

#[derive(Default)]
struct MockState {
    counter: u64,
    customers: HashMap<String, MockCustomer>,
    payment_methods: HashMap<String, RemotePaymentMethod>,
    subscriptions: HashMap<String, RemoteSubscription>,
    create_customer_calls: u64,
    attach_calls: u64,
    fail_operations: HashSet<String>,
    intent_outcome: IntentOutcome,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn check(&self, operation: &'static str) -> CashierResult<()> {
        if self.fail_operations.contains(operation) {
            return Err(CashierError::remote(operation, "injected failure"));
        }
        Ok(())
    }
}

/// In-memory Stripe double implementing [`BillingGateway`].
#[derive(Default, Clone)]
pub struct MockGateway {
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card payment method that exists at Stripe but is not yet
    /// attached to any customer.
    pub fn register_payment_method(&self, id: &str, brand: &str, last4: &str) {
        self.state.write().unwrap().payment_methods.insert(
            id.to_string(),
            RemotePaymentMethod {
                id: id.to_string(),
                customer: None,
                card_brand: Some(brand.to_string()),
                card_last4: Some(last4.to_string()),
            },
        );
    }

    /// Make the named operation fail with a remote error until cleared.
    pub fn fail_on(&self, operation: &str) {
        self.state
            .write()
            .unwrap()
            .fail_operations
            .insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.write().unwrap().fail_operations.clear();
    }

    /// Confirmed intents come back in `requires_action` until reset.
    pub fn respond_requires_action(&self) {
        self.state.write().unwrap().intent_outcome = IntentOutcome::RequiresAction;
    }

    /// Confirmed intents come back with no attached payment method.
    pub fn respond_without_payment_method(&self) {
        self.state.write().unwrap().intent_outcome = IntentOutcome::MissingPaymentMethod;
    }

    pub fn create_customer_calls(&self) -> u64 {
        self.state.read().unwrap().create_customer_calls
    }

    pub fn attach_calls(&self) -> u64 {
        self.state.read().unwrap().attach_calls
    }

    pub fn subscription(&self, id: &str) -> Option<RemoteSubscription> {
        self.state.read().unwrap().subscriptions.get(id).cloned()
    }

    pub fn default_payment_method_of(&self, customer_id: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .customers
            .get(customer_id)
            .and_then(|customer| customer.default_payment_method.clone())
    }

    /// Name the customer was created with, for merge assertions.
    pub fn customer_name(&self, customer_id: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .customers
            .get(customer_id)
            .and_then(|customer| customer.name.clone())
    }

    /// Email the customer was created with, for merge assertions.
    pub fn customer_email(&self, customer_id: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .customers
            .get(customer_id)
            .and_then(|customer| customer.email.clone())
    }

    pub fn payment_methods_of(&self, customer_id: &str) -> Vec<RemotePaymentMethod> {
        self.state
            .read()
            .unwrap()
            .payment_methods
            .values()
            .filter(|method| method.customer.as_deref() == Some(customer_id))
            .cloned()
            .collect()
    }
}

impl BillingGateway for MockGateway {
    async fn create_customer(&self, draft: CustomerDraft) -> CashierResult<RemoteCustomer> {
        let mut state = self.state.write().unwrap();
        state.check("customer.create")?;

        let id = format!("cus_test_{}", state.next());
        state.customers.insert(
            id.clone(),
            MockCustomer {
                name: draft.name,
                email: draft.email,
                default_payment_method: None,
            },
        );
        state.create_customer_calls += 1;

        Ok(RemoteCustomer {
            id,
            default_payment_method: None,
        })
    }

    async fn retrieve_customer(&self, customer_id: &str) -> CashierResult<RemoteCustomer> {
        let state = self.state.read().unwrap();
        state.check("customer.retrieve")?;

        let customer = state
            .customers
            .get(customer_id)
            .ok_or_else(|| CashierError::remote("customer.retrieve", "no such customer"))?;

        Ok(RemoteCustomer {
            id: customer_id.to_string(),
            default_payment_method: customer.default_payment_method.clone(),
        })
    }

    async fn retrieve_customer_expanded(
        &self,
        customer_id: &str,
    ) -> CashierResult<(RemoteCustomer, Option<RemotePaymentMethod>)> {
        let state = self.state.read().unwrap();
        state.check("customer.retrieve")?;

        let customer = state
            .customers
            .get(customer_id)
            .ok_or_else(|| CashierError::remote("customer.retrieve", "no such customer"))?;

        let method = customer
            .default_payment_method
            .as_ref()
            .and_then(|id| state.payment_methods.get(id).cloned());

        Ok((
            RemoteCustomer {
                id: customer_id.to_string(),
                default_payment_method: customer.default_payment_method.clone(),
            },
            method,
        ))
    }

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> CashierResult<()> {
        let mut state = self.state.write().unwrap();
        state.check("customer.update")?;

        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| CashierError::remote("customer.update", "no such customer"))?;
        customer.default_payment_method = Some(payment_method_id.to_string());

        Ok(())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> CashierResult<String> {
        let mut state = self.state.write().unwrap();
        state.check("setup_intent.create")?;

        if !state.customers.contains_key(customer_id) {
            return Err(CashierError::remote("setup_intent.create", "no such customer"));
        }

        let n = state.next();
        Ok(format!("seti_test_{n}_secret_{n}"))
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let state = self.state.read().unwrap();
        state.check("payment_method.retrieve")?;

        state
            .payment_methods
            .get(payment_method_id)
            .cloned()
            .ok_or_else(|| CashierError::remote("payment_method.retrieve", "no such payment method"))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let mut state = self.state.write().unwrap();
        state.check("payment_method.attach")?;

        if !state.customers.contains_key(customer_id) {
            return Err(CashierError::remote("payment_method.attach", "no such customer"));
        }

        let method = state
            .payment_methods
            .get_mut(payment_method_id)
            .ok_or_else(|| CashierError::remote("payment_method.attach", "no such payment method"))?;
        method.customer = Some(customer_id.to_string());
        let method = method.clone();
        state.attach_calls += 1;

        Ok(method)
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let mut state = self.state.write().unwrap();
        state.check("payment_method.detach")?;

        let method = state
            .payment_methods
            .get_mut(payment_method_id)
            .ok_or_else(|| CashierError::remote("payment_method.detach", "no such payment method"))?;

        let previous_customer = method.customer.take();
        let method = method.clone();

        // Stripe clears the invoice-settings pointer when the default
        // method is detached.
        if let Some(customer_id) = previous_customer {
            if let Some(customer) = state.customers.get_mut(&customer_id) {
                if customer.default_payment_method.as_deref() == Some(payment_method_id) {
                    customer.default_payment_method = None;
                }
            }
        }

        Ok(method)
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> CashierResult<Vec<RemotePaymentMethod>> {
        let state = self.state.read().unwrap();
        state.check("payment_method.list")?;

        Ok(state
            .payment_methods
            .values()
            .filter(|method| method.customer.as_deref() == Some(customer_id))
            .cloned()
            .collect())
    }

    async fn create_payment_intent(
        &self,
        draft: PaymentIntentDraft,
    ) -> CashierResult<RemotePaymentIntent> {
        let mut state = self.state.write().unwrap();
        state.check("payment_intent.create")?;

        let n = state.next();
        let (status, payment_method) = match state.intent_outcome {
            IntentOutcome::Succeed => (PaymentIntentState::Succeeded, Some(draft.payment_method)),
            IntentOutcome::RequiresAction => {
                (PaymentIntentState::RequiresAction, Some(draft.payment_method))
            }
            IntentOutcome::MissingPaymentMethod => (PaymentIntentState::Succeeded, None),
        };

        Ok(RemotePaymentIntent {
            id: format!("pi_test_{n}"),
            amount: draft.amount,
            currency: draft.currency,
            status,
            payment_method,
            client_secret: Some(format!("pi_test_{n}_secret_{n}")),
        })
    }

    async fn create_refund(&self, draft: RefundDraft) -> CashierResult<RemoteRefund> {
        let mut state = self.state.write().unwrap();
        state.check("refund.create")?;

        let n = state.next();
        Ok(RemoteRefund {
            id: format!("re_test_{n}"),
            payment_intent: Some(draft.payment_intent),
            status: Some("succeeded".to_string()),
        })
    }

    async fn create_subscription(
        &self,
        draft: SubscriptionDraft,
    ) -> CashierResult<RemoteSubscription> {
        let mut state = self.state.write().unwrap();
        state.check("subscription.create")?;

        if !state.customers.contains_key(&draft.customer) {
            return Err(CashierError::remote("subscription.create", "no such customer"));
        }

        let sub_n = state.next();
        let item_n = state.next();
        let status = if draft.trial_end.is_some() {
            "trialing"
        } else {
            "active"
        };
        let period_end = OffsetDateTime::now_utc().unix_timestamp() + 30 * 24 * 60 * 60;

        let subscription = RemoteSubscription {
            id: format!("sub_test_{sub_n}"),
            customer: draft.customer,
            status: status.to_string(),
            cancel_at_period_end: false,
            cancel_at: None,
            current_period_end: Some(period_end),
            items: vec![RemoteSubscriptionItem {
                id: format!("si_test_{item_n}"),
                price: Some(draft.price),
                quantity: Some(draft.quantity),
            }],
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());

        Ok(subscription)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> CashierResult<RemoteSubscription> {
        let state = self.state.read().unwrap();
        state.check("subscription.retrieve")?;

        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| CashierError::remote("subscription.retrieve", "no such subscription"))
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        change: SubscriptionChange,
    ) -> CashierResult<RemoteSubscription> {
        let mut state = self.state.write().unwrap();
        state.check("subscription.update")?;

        let item_n = change.item.as_ref().map(|_| state.next());
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| CashierError::remote("subscription.update", "no such subscription"))?;

        if let Some(item) = change.item {
            subscription.items.push(RemoteSubscriptionItem {
                id: format!("si_test_{}", item_n.unwrap_or_default()),
                price: Some(item.price),
                quantity: Some(item.quantity),
            });
        }

        if let Some(cancel) = change.cancel_at_period_end {
            subscription.cancel_at_period_end = cancel;
            subscription.cancel_at = if cancel {
                subscription.current_period_end
            } else {
                None
            };
        }

        Ok(subscription.clone())
    }

    async fn delete_subscription_item(&self, item_id: &str) -> CashierResult<()> {
        let mut state = self.state.write().unwrap();
        state.check("subscription_item.delete")?;

        for subscription in state.subscriptions.values_mut() {
            let before = subscription.items.len();
            subscription.items.retain(|item| item.id != item_id);
            if subscription.items.len() < before {
                return Ok(());
            }
        }

        Err(CashierError::remote("subscription_item.delete", "no such subscription item"))
    }

    async fn create_checkout_session(
        &self,
        _draft: CheckoutDraft,
    ) -> CashierResult<RemoteCheckoutSession> {
        let mut state = self.state.write().unwrap();
        state.check("checkout.session.create")?;

        let n = state.next();
        let id = format!("cs_test_{n}");
        Ok(RemoteCheckoutSession {
            url: Some(format!("https://checkout.stripe.test/c/pay/{id}")),
            id,
        })
    }
}

#[derive(Default)]
struct StoreInner {
    next_id: i64,
    records: HashMap<(String, String), SubscriptionRecord>,
}

/// [`SubscriptionStore`] keyed on `(user_id, type)` in memory, enforcing
/// the one-record-per-pair invariant the way the Postgres store's unique
/// index does.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_records(&self) -> Vec<SubscriptionRecord> {
        self.inner.read().unwrap().records.values().cloned().collect()
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_user_and_type(
        &self,
        user_id: &str,
        type_: &str,
    ) -> CashierResult<Option<SubscriptionRecord>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .records
            .get(&(user_id.to_string(), type_.to_string()))
            .cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> CashierResult<Vec<SubscriptionRecord>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .records
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord> {
        let mut inner = self.inner.write().unwrap();
        let key = (record.user_id.clone(), record.type_.clone());

        if inner.records.contains_key(&key) {
            return Err(CashierError::Conflict(format!(
                "subscription already exists for user {} and type {}",
                record.user_id, record.type_
            )));
        }

        inner.next_id += 1;
        let mut record = record;
        record.id = inner.next_id;
        inner.records.insert(key, record.clone());

        Ok(record)
    }

    async fn update(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord> {
        let mut inner = self.inner.write().unwrap();
        let key = (record.user_id.clone(), record.type_.clone());

        let stored = inner.records.get_mut(&key).ok_or_else(|| {
            CashierError::NotFound(format!(
                "no subscription for user {} and type {}",
                record.user_id, record.type_
            ))
        })?;

        stored.stripe_id = record.stripe_id;
        stored.stripe_status = record.stripe_status;
        stored.stripe_price = record.stripe_price;
        stored.quantity = record.quantity;
        stored.ends_at = record.ends_at;
        stored.updated_at = OffsetDateTime::now_utc();

        Ok(stored.clone())
    }

    async fn delete_by_id(&self, id: i64) -> CashierResult<()> {
        self.inner
            .write()
            .unwrap()
            .records
            .retain(|_, record| record.id != id);
        Ok(())
    }

    async fn delete_by_stripe_id(&self, stripe_id: &str) -> CashierResult<()> {
        self.inner
            .write()
            .unwrap()
            .records
            .retain(|_, record| record.stripe_id != stripe_id);
        Ok(())
    }

    async fn update_ends_at(
        &self,
        id: i64,
        ends_at: Option<OffsetDateTime>,
    ) -> CashierResult<()> {
        let mut inner = self.inner.write().unwrap();
        for record in inner.records.values_mut() {
            if record.id == id {
                record.ends_at = ends_at;
                record.updated_at = OffsetDateTime::now_utc();
                return Ok(());
            }
        }

        Err(CashierError::NotFound(format!("no subscription with id {id}")))
    }
}

/// [`UserDirectory`] recording persisted customer-id assignments.
#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The customer id persisted for a user, if any.
    pub fn persisted(&self, billing_key: &str) -> Option<String> {
        self.inner.read().unwrap().get(billing_key).cloned()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    async fn persist_remote_customer_id(
        &self,
        billing_key: &str,
        remote_customer_id: &str,
    ) -> CashierResult<()> {
        self.inner
            .write()
            .unwrap()
            .insert(billing_key.to_string(), remote_customer_id.to_string());
        Ok(())
    }
}

/// Minimal [`Billable`] implementation for tests.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub locales: Option<Vec<String>>,
    pub stripe_id: Option<String>,
}

impl TestUser {
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some("Test User".to_string()),
            email: Some(email.to_string()),
            phone: None,
            locales: None,
            stripe_id: None,
        }
    }

    pub fn with_stripe_id(mut self, stripe_id: &str) -> Self {
        self.stripe_id = Some(stripe_id.to_string());
        self
    }
}

impl Billable for TestUser {
    fn billing_key(&self) -> String {
        self.id.clone()
    }

    fn remote_customer_id(&self) -> Option<String> {
        self.stripe_id.clone()
    }

    fn set_remote_customer_id(&mut self, id: Option<String>) {
        self.stripe_id = id;
    }

    fn display_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn email(&self) -> Option<String> {
        self.email.clone()
    }

    fn phone(&self) -> Option<String> {
        self.phone.clone()
    }

    fn preferred_locales(&self) -> Option<Vec<String>> {
        self.locales.clone()
    }
}
