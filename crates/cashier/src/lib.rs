//! Stripe billing for any user type
//!
//! This crate attaches billing capability to any user-like entity: implement
//! [`Billable`] for your user type, build a [`Cashier`] once at startup with
//! a gateway and store, and wrap users into [`BillableUser`] facades per
//! request:
//!
//! ```rust,ignore
//! let stripe = Arc::new(StripeClient::from_env()?);
//! let store = Arc::new(PgSubscriptionStore::new(pool));
//! let cashier = Cashier::new(stripe, store, Arc::new(users));
//!
//! let billable = cashier.billable(user);
//! billable.customer().create_remote_customer(Default::default()).await?;
//! billable.charge().charge(14.99, None, Default::default()).await?;
//! billable.subscribe().price("price_pro").start(Default::default(), None, None).await?;
//! ```

pub mod charge;
pub mod checkout;
pub mod client;
pub mod customer;
pub mod entity;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod payment_method;
pub mod postgres;
pub mod store;
pub mod subscription;
pub mod subscription_builder;
pub mod testing;

pub use charge::{ChargeManager, ChargeOptions, RefundOptions};
pub use checkout::CheckoutBuilder;
pub use client::{StripeClient, StripeConfig};
pub use customer::CustomerManager;
pub use entity::{Billable, UserDirectory};
pub use error::{CashierError, CashierResult};
pub use facade::{BillableUser, Cashier};
pub use gateway::{
    BillingGateway, CheckoutDraft, CustomerDraft, PaymentIntentDraft, PaymentIntentState,
    RefundDraft, RemoteCheckoutSession, RemoteCustomer, RemotePaymentIntent, RemotePaymentMethod,
    RemoteRefund, RemoteSubscription, RemoteSubscriptionItem, SubscriptionChange,
    SubscriptionItemChange, SubscriptionDraft,
};
pub use payment_method::PaymentMethodManager;
pub use postgres::PgSubscriptionStore;
pub use store::{
    SubscriptionRecord, SubscriptionState, SubscriptionStore, DEFAULT_SUBSCRIPTION_TYPE,
};
pub use subscription::SubscriptionManager;
pub use subscription_builder::SubscriptionBuilder;
