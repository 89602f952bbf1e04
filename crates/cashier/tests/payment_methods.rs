//! Payment method attachment, defaults and deletion invariants

#![allow(clippy::unwrap_used)]

mod common;

use cashier::{BillableUser, CashierError, CustomerDraft};
use cashier::testing::{InMemorySubscriptionStore, InMemoryUserDirectory, MockGateway, TestUser};
use common::{harness, user, Harness};

type TestBillable = BillableUser<TestUser, InMemorySubscriptionStore, MockGateway, InMemoryUserDirectory>;

async fn billable_with_customer(h: &Harness, id: &str) -> TestBillable {
    let billable = h.cashier.billable(user(id));
    billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();
    billable
}

#[tokio::test]
async fn operations_require_a_remote_customer() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let err = billable.payment_method().create_setup_intent().await.unwrap_err();
    assert!(matches!(err, CashierError::Precondition(_)));

    let err = billable.payment_method().list_payment_methods().await.unwrap_err();
    assert!(matches!(err, CashierError::Precondition(_)));
}

#[tokio::test]
async fn setup_intent_returns_a_client_secret() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;

    let secret = billable.payment_method().create_setup_intent().await.unwrap();
    assert!(secret.contains("secret"));
}

#[tokio::test]
async fn add_payment_method_attaches_at_most_once() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;
    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");

    let first = billable
        .payment_method()
        .add_payment_method("pm_card_visa")
        .await
        .unwrap();
    let second = billable
        .payment_method()
        .add_payment_method("pm_card_visa")
        .await
        .unwrap();

    assert_eq!(first.id, "pm_card_visa");
    assert_eq!(second.id, "pm_card_visa");
    assert_eq!(h.gateway.attach_calls(), 1);
}

#[tokio::test]
async fn default_payment_method_is_none_without_customer_or_default() {
    let h = harness();

    let unbilled = h.cashier.billable(user("user-1"));
    assert!(unbilled.payment_method().default_payment_method().await.unwrap().is_none());

    let billable = billable_with_customer(&h, "user-2").await;
    assert!(billable.payment_method().default_payment_method().await.unwrap().is_none());
}

#[tokio::test]
async fn set_default_round_trips() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;
    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");

    let method = billable
        .payment_method()
        .add_payment_method("pm_card_visa")
        .await
        .unwrap();
    billable.payment_method().set_default_payment_method(&method).await.unwrap();

    let default = billable
        .payment_method()
        .default_payment_method()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(default.id, "pm_card_visa");
    assert_eq!(default.card_brand.as_deref(), Some("visa"));
}

#[tokio::test]
async fn deleting_the_only_payment_method_fails_and_leaves_it_attached() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;
    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");

    let method = billable
        .payment_method()
        .add_payment_method("pm_card_visa")
        .await
        .unwrap();
    billable.payment_method().set_default_payment_method(&method).await.unwrap();

    let err = billable
        .payment_method()
        .delete_payment_method("pm_card_visa")
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::Precondition(_)));
    assert_eq!(billable.payment_method().list_payment_methods().await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_the_default_promotes_another_method_first() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;
    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");
    h.gateway.register_payment_method("pm_card_amex", "amex", "0005");

    let visa = billable
        .payment_method()
        .add_payment_method("pm_card_visa")
        .await
        .unwrap();
    billable.payment_method().add_payment_method("pm_card_amex").await.unwrap();
    billable.payment_method().set_default_payment_method(&visa).await.unwrap();

    let deleted = billable
        .payment_method()
        .delete_payment_method("pm_card_visa")
        .await
        .unwrap();
    assert!(deleted);

    let remaining = billable.payment_method().list_payment_methods().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "pm_card_amex");

    let default = billable
        .payment_method()
        .default_payment_method()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(default.id, "pm_card_amex");
}

#[tokio::test]
async fn deleting_a_foreign_payment_method_fails() {
    let h = harness();
    let billable = billable_with_customer(&h, "user-1").await;
    let other = billable_with_customer(&h, "user-2").await;

    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");
    h.gateway.register_payment_method("pm_card_mine", "visa", "1111");
    h.gateway.register_payment_method("pm_card_mine_2", "visa", "2222");

    other.payment_method().add_payment_method("pm_card_visa").await.unwrap();
    billable.payment_method().add_payment_method("pm_card_mine").await.unwrap();
    billable.payment_method().add_payment_method("pm_card_mine_2").await.unwrap();

    let err = billable
        .payment_method()
        .delete_payment_method("pm_card_visa")
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::Precondition(_)));
}
