//! Hosted checkout sessions

#![allow(clippy::unwrap_used)]

mod common;

use cashier::{CashierError, CustomerDraft};
use common::{harness, user};

#[tokio::test]
async fn complete_returns_the_hosted_session_url() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));
    billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    let url = billable
        .checkout()
        .await
        .price("price_x")
        .quantity(2)
        .success_url("https://app.example.com/billing/success")
        .cancel_url("https://app.example.com/billing/cancel")
        .complete()
        .await
        .unwrap();

    assert!(url.starts_with("https://checkout.stripe.test/"));
}

#[tokio::test]
async fn complete_requires_price_and_urls() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let err = billable
        .checkout()
        .await
        .success_url("https://app.example.com/ok")
        .cancel_url("https://app.example.com/ko")
        .complete()
        .await
        .unwrap_err();
    assert!(matches!(err, CashierError::InvalidArgument(_)));

    let err = billable
        .checkout()
        .await
        .price("price_x")
        .cancel_url("https://app.example.com/ko")
        .complete()
        .await
        .unwrap_err();
    assert!(matches!(err, CashierError::InvalidArgument(_)));
}

#[tokio::test]
async fn gateway_failure_propagates_instead_of_falling_back() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));
    h.gateway.fail_on("checkout.session.create");

    let err = billable
        .checkout()
        .await
        .price("price_x")
        .success_url("https://app.example.com/ok")
        .cancel_url("https://app.example.com/ko")
        .complete()
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::RemoteApi { .. }));
}
