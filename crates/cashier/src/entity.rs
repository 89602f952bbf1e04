//! Capability traits the host application implements for its user type

use crate::error::CashierResult;

/// Implemented by any user-like type that can carry billing state.
///
/// The crate never owns the entity's lifetime; it only reads the identity
/// fields below and writes the Stripe customer id back after creating the
/// remote customer.
pub trait Billable: Send + Sync {
    /// Stable local identifier for this user, used when persisting the
    /// Stripe customer id through a [`UserDirectory`].
    fn billing_key(&self) -> String;

    /// The Stripe customer id, if one has been assigned.
    fn remote_customer_id(&self) -> Option<String>;

    /// Store a newly assigned Stripe customer id on the entity.
    fn set_remote_customer_id(&mut self, id: Option<String>);

    /// Display name forwarded to Stripe when creating the customer.
    fn display_name(&self) -> Option<String> {
        None
    }

    fn email(&self) -> Option<String> {
        None
    }

    fn phone(&self) -> Option<String> {
        None
    }

    fn preferred_locales(&self) -> Option<Vec<String>> {
        None
    }
}

/// Host-side persistence for the billing columns of the user entity.
///
/// [`crate::customer::CustomerManager`] calls this after a Stripe customer
/// is created so the assignment survives the request.
#[allow(async_fn_in_trait)]
pub trait UserDirectory: Send + Sync {
    async fn persist_remote_customer_id(
        &self,
        billing_key: &str,
        remote_customer_id: &str,
    ) -> CashierResult<()>;
}
