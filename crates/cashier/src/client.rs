//! Stripe client configuration and the async-stripe gateway implementation

use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{
    AttachPaymentMethod, CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCustomer, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods,
    CreatePaymentIntentAutomaticPaymentMethodsAllowRedirects, CreateRefund, CreateSetupIntent,
    CreateSubscription, CreateSubscriptionItems, Currency, Customer, CustomerId,
    CustomerInvoiceSettings, Expandable, ListPaymentMethods, PaymentIntent, PaymentIntentId,
    PaymentIntentStatus, PaymentMethod, PaymentMethodId, PaymentMethodTypeFilter, Refund,
    SetupIntent, Subscription, SubscriptionId, SubscriptionItem, SubscriptionItemId,
    SubscriptionStatus as StripeSubStatus, UpdateCustomer, UpdateSubscription,
    UpdateSubscriptionItems,
};

use crate::error::{CashierError, CashierResult};
use crate::gateway::{
    BillingGateway, CheckoutDraft, CustomerDraft, PaymentIntentDraft, PaymentIntentState,
    RefundDraft, RemoteCheckoutSession, RemoteCustomer, RemotePaymentIntent, RemotePaymentMethod,
    RemoteRefund, RemoteSubscription, RemoteSubscriptionItem, SubscriptionChange, SubscriptionDraft,
};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// ISO currency code used for one-off charges, lowercase
    pub currency: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> CashierResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| CashierError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            currency: std::env::var("CASHIER_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
        })
    }
}

/// Stripe billing client implementing [`BillingGateway`]
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> CashierResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

fn subscription_status_str(status: StripeSubStatus) -> &'static str {
    match status {
        StripeSubStatus::Active => "active",
        StripeSubStatus::PastDue => "past_due",
        StripeSubStatus::Canceled => "canceled",
        StripeSubStatus::Unpaid => "unpaid",
        StripeSubStatus::Trialing => "trialing",
        StripeSubStatus::Incomplete => "incomplete",
        StripeSubStatus::IncompleteExpired => "incomplete_expired",
        StripeSubStatus::Paused => "paused",
    }
}

fn intent_state(status: PaymentIntentStatus) -> PaymentIntentState {
    match status {
        PaymentIntentStatus::Succeeded => PaymentIntentState::Succeeded,
        PaymentIntentStatus::Processing => PaymentIntentState::Processing,
        PaymentIntentStatus::RequiresAction => PaymentIntentState::RequiresAction,
        PaymentIntentStatus::RequiresConfirmation => PaymentIntentState::RequiresConfirmation,
        PaymentIntentStatus::RequiresPaymentMethod => PaymentIntentState::RequiresPaymentMethod,
        PaymentIntentStatus::RequiresCapture => PaymentIntentState::RequiresCapture,
        PaymentIntentStatus::Canceled => PaymentIntentState::Canceled,
    }
}

fn payment_method_dto(method: PaymentMethod) -> RemotePaymentMethod {
    RemotePaymentMethod {
        id: method.id.to_string(),
        customer: method.customer.as_ref().map(|customer| match customer {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(customer) => customer.id.to_string(),
        }),
        card_brand: method.card.as_ref().map(|card| card.brand.clone()),
        card_last4: method.card.as_ref().map(|card| card.last4.clone()),
    }
}

fn customer_dto(customer: &Customer) -> RemoteCustomer {
    RemoteCustomer {
        id: customer.id.to_string(),
        default_payment_method: customer
            .invoice_settings
            .as_ref()
            .and_then(|settings| settings.default_payment_method.as_ref())
            .map(|method| match method {
                Expandable::Id(id) => id.to_string(),
                Expandable::Object(method) => method.id.to_string(),
            }),
    }
}

fn subscription_dto(subscription: Subscription) -> RemoteSubscription {
    let customer = match &subscription.customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    };

    RemoteSubscription {
        id: subscription.id.to_string(),
        customer,
        status: subscription_status_str(subscription.status).to_string(),
        cancel_at_period_end: subscription.cancel_at_period_end,
        cancel_at: subscription.cancel_at,
        current_period_end: (subscription.current_period_end > 0)
            .then_some(subscription.current_period_end),
        items: subscription
            .items
            .data
            .iter()
            .map(|item| RemoteSubscriptionItem {
                id: item.id.to_string(),
                price: item.price.as_ref().map(|price| price.id.to_string()),
                quantity: item.quantity,
            })
            .collect(),
    }
}

impl BillingGateway for StripeClient {
    async fn create_customer(&self, draft: CustomerDraft) -> CashierResult<RemoteCustomer> {
        let params = CreateCustomer {
            name: draft.name.as_deref(),
            email: draft.email.as_deref(),
            phone: draft.phone.as_deref(),
            preferred_locales: draft.preferred_locales.clone(),
            metadata: (!draft.metadata.is_empty()).then(|| draft.metadata.clone()),
            ..Default::default()
        };

        let customer = Customer::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("customer.create", e))?;

        Ok(customer_dto(&customer))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> CashierResult<RemoteCustomer> {
        let id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("customer.retrieve", format!("invalid customer ID: {e}")))?;

        let customer = Customer::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CashierError::remote("customer.retrieve", e))?;

        Ok(customer_dto(&customer))
    }

    async fn retrieve_customer_expanded(
        &self,
        customer_id: &str,
    ) -> CashierResult<(RemoteCustomer, Option<RemotePaymentMethod>)> {
        let id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("customer.retrieve", format!("invalid customer ID: {e}")))?;

        let customer =
            Customer::retrieve(&self.client, &id, &["invoice_settings.default_payment_method"])
                .await
                .map_err(|e| CashierError::remote("customer.retrieve", e))?;

        let method = match customer
            .invoice_settings
            .as_ref()
            .and_then(|settings| settings.default_payment_method.as_ref())
        {
            Some(Expandable::Object(method)) => Some(payment_method_dto((**method).clone())),
            Some(Expandable::Id(method_id)) => {
                Some(self.retrieve_payment_method(method_id.as_str()).await?)
            }
            None => None,
        };

        Ok((customer_dto(&customer), method))
    }

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> CashierResult<()> {
        let id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("customer.update", format!("invalid customer ID: {e}")))?;

        let params = UpdateCustomer {
            invoice_settings: Some(CustomerInvoiceSettings {
                default_payment_method: Some(payment_method_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        Customer::update(&self.client, &id, params)
            .await
            .map_err(|e| CashierError::remote("customer.update", e))?;

        Ok(())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> CashierResult<String> {
        let id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("setup_intent.create", format!("invalid customer ID: {e}")))?;

        let mut params = CreateSetupIntent::new();
        params.customer = Some(id);

        let intent = SetupIntent::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("setup_intent.create", e))?;

        intent
            .client_secret
            .ok_or_else(|| CashierError::remote("setup_intent.create", "setup intent has no client secret"))
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let id = payment_method_id.parse::<PaymentMethodId>().map_err(|e| {
            CashierError::remote("payment_method.retrieve", format!("invalid payment method ID: {e}"))
        })?;

        let method = PaymentMethod::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CashierError::remote("payment_method.retrieve", e))?;

        Ok(payment_method_dto(method))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let id = payment_method_id.parse::<PaymentMethodId>().map_err(|e| {
            CashierError::remote("payment_method.attach", format!("invalid payment method ID: {e}"))
        })?;
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("payment_method.attach", format!("invalid customer ID: {e}")))?;

        let method = PaymentMethod::attach(&self.client, &id, AttachPaymentMethod { customer })
            .await
            .map_err(|e| CashierError::remote("payment_method.attach", e))?;

        Ok(payment_method_dto(method))
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let id = payment_method_id.parse::<PaymentMethodId>().map_err(|e| {
            CashierError::remote("payment_method.detach", format!("invalid payment method ID: {e}"))
        })?;

        let method = PaymentMethod::detach(&self.client, &id)
            .await
            .map_err(|e| CashierError::remote("payment_method.detach", e))?;

        Ok(payment_method_dto(method))
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> CashierResult<Vec<RemotePaymentMethod>> {
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("payment_method.list", format!("invalid customer ID: {e}")))?;

        let params = ListPaymentMethods {
            customer: Some(customer),
            type_: Some(PaymentMethodTypeFilter::Card),
            ..Default::default()
        };

        let methods = PaymentMethod::list(&self.client, &params)
            .await
            .map_err(|e| CashierError::remote("payment_method.list", e))?;

        Ok(methods.data.into_iter().map(payment_method_dto).collect())
    }

    async fn create_payment_intent(
        &self,
        draft: PaymentIntentDraft,
    ) -> CashierResult<RemotePaymentIntent> {
        let currency = draft
            .currency
            .parse::<Currency>()
            .map_err(|_| CashierError::InvalidArgument(format!("unsupported currency: {}", draft.currency)))?;
        let payment_method = draft.payment_method.parse::<PaymentMethodId>().map_err(|e| {
            CashierError::remote("payment_intent.create", format!("invalid payment method ID: {e}"))
        })?;

        let mut params = CreatePaymentIntent::new(draft.amount, currency);
        params.payment_method = Some(payment_method);
        params.confirm = Some(true);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            allow_redirects: Some(CreatePaymentIntentAutomaticPaymentMethodsAllowRedirects::Never),
            enabled: true,
        });
        if let Some(customer) = draft.customer.as_deref() {
            params.customer = Some(customer.parse::<CustomerId>().map_err(|e| {
                CashierError::remote("payment_intent.create", format!("invalid customer ID: {e}"))
            })?);
        }
        params.description = draft.description.as_deref();
        params.metadata = (!draft.metadata.is_empty()).then(|| draft.metadata.clone());

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("payment_intent.create", e))?;

        Ok(RemotePaymentIntent {
            id: intent.id.to_string(),
            amount: intent.amount,
            currency: intent.currency.to_string(),
            status: intent_state(intent.status),
            payment_method: intent.payment_method.as_ref().map(|method| match method {
                Expandable::Id(id) => id.to_string(),
                Expandable::Object(method) => method.id.to_string(),
            }),
            client_secret: intent.client_secret,
        })
    }

    async fn create_refund(&self, draft: RefundDraft) -> CashierResult<RemoteRefund> {
        let payment_intent = draft.payment_intent.parse::<PaymentIntentId>().map_err(|e| {
            CashierError::remote("refund.create", format!("invalid payment intent ID: {e}"))
        })?;

        let params = CreateRefund {
            payment_intent: Some(payment_intent),
            amount: draft.amount,
            metadata: (!draft.metadata.is_empty()).then(|| draft.metadata.clone()),
            ..Default::default()
        };

        let refund = Refund::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("refund.create", e))?;

        Ok(RemoteRefund {
            id: refund.id.to_string(),
            payment_intent: refund.payment_intent.as_ref().map(|intent| match intent {
                Expandable::Id(id) => id.to_string(),
                Expandable::Object(intent) => intent.id.to_string(),
            }),
            status: refund.status.as_ref().map(|status| status.to_string()),
        })
    }

    async fn create_subscription(
        &self,
        draft: SubscriptionDraft,
    ) -> CashierResult<RemoteSubscription> {
        let customer = draft
            .customer
            .parse::<CustomerId>()
            .map_err(|e| CashierError::remote("subscription.create", format!("invalid customer ID: {e}")))?;

        let mut params = CreateSubscription::new(customer);
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(draft.price.clone()),
            quantity: Some(draft.quantity),
            ..Default::default()
        }]);
        params.default_payment_method = Some(draft.default_payment_method.as_str());
        params.trial_end = draft.trial_end.map(stripe::Scheduled::Timestamp);
        params.metadata = (!draft.metadata.is_empty()).then(|| draft.metadata.clone());
        params.expand = &["latest_invoice.payment_intent"];

        let subscription = Subscription::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("subscription.create", e))?;

        Ok(subscription_dto(subscription))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> CashierResult<RemoteSubscription> {
        let id = subscription_id.parse::<SubscriptionId>().map_err(|e| {
            CashierError::remote("subscription.retrieve", format!("invalid subscription ID: {e}"))
        })?;

        let subscription = Subscription::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CashierError::remote("subscription.retrieve", e))?;

        Ok(subscription_dto(subscription))
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        change: SubscriptionChange,
    ) -> CashierResult<RemoteSubscription> {
        let id = subscription_id.parse::<SubscriptionId>().map_err(|e| {
            CashierError::remote("subscription.update", format!("invalid subscription ID: {e}"))
        })?;

        let mut params = UpdateSubscription::new();
        if let Some(item) = change.item {
            params.items = Some(vec![UpdateSubscriptionItems {
                price: Some(item.price),
                quantity: Some(item.quantity),
                ..Default::default()
            }]);
        }
        params.cancel_at_period_end = change.cancel_at_period_end;
        if change.always_invoice {
            params.proration_behavior = Some(SubscriptionProrationBehavior::AlwaysInvoice);
        }

        let subscription = Subscription::update(&self.client, &id, params)
            .await
            .map_err(|e| CashierError::remote("subscription.update", e))?;

        Ok(subscription_dto(subscription))
    }

    async fn delete_subscription_item(&self, item_id: &str) -> CashierResult<()> {
        let id = item_id.parse::<SubscriptionItemId>().map_err(|e| {
            CashierError::remote("subscription_item.delete", format!("invalid subscription item ID: {e}"))
        })?;

        SubscriptionItem::delete(&self.client, &id)
            .await
            .map_err(|e| CashierError::remote("subscription_item.delete", e))?;

        Ok(())
    }

    async fn create_checkout_session(
        &self,
        draft: CheckoutDraft,
    ) -> CashierResult<RemoteCheckoutSession> {
        let customer = draft
            .customer
            .as_deref()
            .map(|customer| customer.parse::<CustomerId>())
            .transpose()
            .map_err(|e| {
                CashierError::remote("checkout.session.create", format!("invalid customer ID: {e}"))
            })?;

        let params = CreateCheckoutSession {
            customer,
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(draft.price.clone()),
                quantity: Some(draft.quantity),
                ..Default::default()
            }]),
            success_url: Some(&draft.success_url),
            cancel_url: Some(&draft.cancel_url),
            ..Default::default()
        };

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| CashierError::remote("checkout.session.create", e))?;

        Ok(RemoteCheckoutSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }
}
