//! Stored payment instruments and the default-instrument pointer

use std::sync::Arc;

use crate::entity::{Billable, UserDirectory};
use crate::error::{CashierError, CashierResult};
use crate::gateway::{BillingGateway, RemotePaymentMethod};
use crate::customer::CustomerManager;

/// Manages the payment methods attached to the user's Stripe customer.
///
/// Every operation requires the associated [`CustomerManager`] to hold a
/// remote customer id and fails with a precondition error otherwise.
pub struct PaymentMethodManager<U, G, R> {
    customers: CustomerManager<U, G, R>,
    gateway: Arc<G>,
}

impl<U, G, R> Clone for PaymentMethodManager<U, G, R> {
    fn clone(&self) -> Self {
        Self {
            customers: self.customers.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<U, G, R> PaymentMethodManager<U, G, R>
where
    U: Billable,
    G: BillingGateway,
    R: UserDirectory,
{
    pub fn new(customers: CustomerManager<U, G, R>, gateway: Arc<G>) -> Self {
        Self { customers, gateway }
    }

    async fn require_customer_id(&self) -> CashierResult<String> {
        self.customers.remote_id().await.ok_or_else(|| {
            CashierError::Precondition("user has no Stripe customer".to_string())
        })
    }

    /// Create a setup intent scoped to the customer and return the client
    /// secret for the host's client-side confirmation flow.
    pub async fn create_setup_intent(&self) -> CashierResult<String> {
        let customer_id = self.require_customer_id().await?;
        self.gateway.create_setup_intent(&customer_id).await
    }

    /// Attach a payment method to the customer.
    ///
    /// Idempotent: a method already attached to this customer is returned
    /// as-is without another attach call.
    pub async fn add_payment_method(
        &self,
        payment_method_id: &str,
    ) -> CashierResult<RemotePaymentMethod> {
        let customer_id = self.require_customer_id().await?;

        let method = self.gateway.retrieve_payment_method(payment_method_id).await?;
        if method.customer.as_deref() == Some(customer_id.as_str()) {
            return Ok(method);
        }

        let attached = self
            .gateway
            .attach_payment_method(payment_method_id, &customer_id)
            .await?;

        tracing::info!(
            customer_id = %customer_id,
            payment_method_id = %attached.id,
            "Attached payment method"
        );

        Ok(attached)
    }

    /// List the card payment methods attached to the customer.
    pub async fn list_payment_methods(&self) -> CashierResult<Vec<RemotePaymentMethod>> {
        let customer_id = self.require_customer_id().await?;
        self.gateway.list_card_payment_methods(&customer_id).await
    }

    /// Point the customer's invoice settings at the given method.
    pub async fn set_default_payment_method(
        &self,
        method: &RemotePaymentMethod,
    ) -> CashierResult<()> {
        let customer_id = self.require_customer_id().await?;
        self.gateway
            .update_default_payment_method(&customer_id, &method.id)
            .await?;

        tracing::info!(
            customer_id = %customer_id,
            payment_method_id = %method.id,
            "Set default payment method"
        );

        Ok(())
    }

    /// The customer's default payment method, or `None` when the user has
    /// no remote customer or no default is set.
    pub async fn default_payment_method(&self) -> CashierResult<Option<RemotePaymentMethod>> {
        let Some(customer_id) = self.customers.remote_id().await else {
            return Ok(None);
        };

        let (_, method) = self.gateway.retrieve_customer_expanded(&customer_id).await?;
        Ok(method)
    }

    /// Detach a payment method from the customer.
    ///
    /// The sole remaining method can never be removed, and a method attached
    /// to a different customer is rejected. When the method being removed is
    /// the current default, another attached method is promoted to default
    /// before the detach so the customer is never left without one.
    ///
    /// Returns true iff the detached resource's id matches the requested id.
    pub async fn delete_payment_method(&self, payment_method_id: &str) -> CashierResult<bool> {
        let customer_id = self.require_customer_id().await?;

        let method = self.gateway.retrieve_payment_method(payment_method_id).await?;
        if method.customer.as_deref() != Some(customer_id.as_str()) {
            return Err(CashierError::Precondition(
                "payment method is not attached to this customer".to_string(),
            ));
        }

        let methods = self.gateway.list_card_payment_methods(&customer_id).await?;
        if methods.len() < 2 {
            return Err(CashierError::Precondition(
                "cannot delete the only payment method".to_string(),
            ));
        }

        if let Some(default) = self.default_payment_method().await? {
            if default.id == payment_method_id {
                if let Some(replacement) =
                    methods.iter().find(|method| method.id != payment_method_id)
                {
                    self.set_default_payment_method(replacement).await?;
                }
            }
        }

        let detached = self.gateway.detach_payment_method(payment_method_id).await?;

        tracing::info!(
            customer_id = %customer_id,
            payment_method_id = %payment_method_id,
            "Detached payment method"
        );

        Ok(detached.id == payment_method_id)
    }
}
