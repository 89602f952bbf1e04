//! Customer creation, retrieval and idempotence

#![allow(clippy::unwrap_used)]

mod common;

use cashier::{CashierError, CustomerDraft};
use common::{harness, user};

#[tokio::test]
async fn create_remote_customer_is_idempotent() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let first = billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();
    let second = billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.gateway.create_customer_calls(), 1);
}

#[tokio::test]
async fn created_customer_id_is_stored_and_persisted() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let id = billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    assert_eq!(billable.user().await.stripe_id.as_deref(), Some(id.as_str()));
    assert_eq!(h.directory.persisted("user-1"), Some(id));
}

#[tokio::test]
async fn entity_fields_fill_unset_draft_fields() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let id = billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    assert_eq!(h.gateway.customer_email(&id).as_deref(), Some("user-1@example.com"));
    assert_eq!(h.gateway.customer_name(&id).as_deref(), Some("Test User"));
}

#[tokio::test]
async fn explicit_draft_fields_win_over_entity_defaults() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let id = billable
        .customer()
        .create_remote_customer(CustomerDraft {
            email: Some("billing@example.com".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(h.gateway.customer_email(&id).as_deref(), Some("billing@example.com"));
    assert_eq!(h.gateway.customer_name(&id).as_deref(), Some("Test User"));
}

#[tokio::test]
async fn fetch_returns_none_without_remote_id() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    assert!(!billable.customer().has_remote_id().await);
    assert!(billable.customer().fetch_remote_customer().await.unwrap().is_none());
}

#[tokio::test]
async fn create_or_fetch_creates_once_then_fetches() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let created = billable
        .customer()
        .create_or_fetch_remote_customer(CustomerDraft::default())
        .await
        .unwrap();
    let fetched = billable
        .customer()
        .create_or_fetch_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    assert_eq!(created.id, fetched.id);
    assert_eq!(h.gateway.create_customer_calls(), 1);
}

#[tokio::test]
async fn gateway_failure_propagates_and_leaves_entity_untouched() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));
    h.gateway.fail_on("customer.create");

    let err = billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::RemoteApi { .. }));
    assert!(billable.user().await.stripe_id.is_none());
    assert!(h.directory.persisted("user-1").is_none());
}
