//! Subscription creation, lifecycle predicates, cancellation and swaps

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::HashMap;

use cashier::{BillableUser, CashierError, CustomerDraft, SubscriptionState};
use cashier::testing::{InMemorySubscriptionStore, InMemoryUserDirectory, MockGateway, TestUser};
use common::{harness, user, Harness};

type TestBillable = BillableUser<TestUser, InMemorySubscriptionStore, MockGateway, InMemoryUserDirectory>;

async fn billable_with_default_method(h: &Harness, id: &str, method: &str) -> TestBillable {
    let billable = h.cashier.billable(user(id));
    billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();
    h.gateway.register_payment_method(method, "visa", "4242");
    let attached = billable.payment_method().add_payment_method(method).await.unwrap();
    billable.payment_method().set_default_payment_method(&attached).await.unwrap();
    billable
}

#[tokio::test]
async fn start_creates_the_remote_subscription_and_local_mirror() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let subscription = billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    let customer_id = billable.user().await.stripe_id.clone().unwrap();
    let record = billable.subscription().record(None).await.unwrap();

    assert_eq!(record.user_id, customer_id);
    assert_eq!(record.type_, "default");
    assert_eq!(record.stripe_id, subscription.id);
    assert_eq!(record.stripe_price.as_deref(), Some("price_x"));
    assert_eq!(record.quantity, Some(1));
    assert!(record.ends_at.is_none());
    assert!(record.trial_ends_at.is_none());
    assert_eq!(record.stripe_status, "active");
}

#[tokio::test]
async fn start_requires_a_price() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let err = billable
        .subscribe()
        .start(HashMap::new(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::InvalidArgument(_)));
}

#[tokio::test]
async fn start_requires_a_remote_customer() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let err = billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::Precondition(_)));
}

#[tokio::test]
async fn start_requires_some_payment_method() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));
    billable
        .customer()
        .create_remote_customer(CustomerDraft::default())
        .await
        .unwrap();

    let err = billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::InvalidArgument(_)));
}

#[tokio::test]
async fn trial_window_is_validated() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    assert!(matches!(
        billable.subscribe().price("price_x").trial_days(0),
        Err(CashierError::InvalidArgument(_))
    ));
    assert!(matches!(
        billable
            .subscribe()
            .price("price_x")
            .trial_until(time::OffsetDateTime::now_utc() - time::Duration::days(1)),
        Err(CashierError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn trial_start_creates_a_trialing_subscription() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let subscription = billable
        .subscribe()
        .price("price_x")
        .trial_days(7)
        .unwrap()
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    assert_eq!(subscription.status, "trialing");

    let record = billable.subscription().record(None).await.unwrap();
    assert_eq!(record.stripe_status, "trialing");
    assert!(record.trial_ends_at.is_none());
}

#[tokio::test]
async fn starting_the_same_type_again_upserts_the_record() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();
    let second = billable
        .subscribe()
        .price("price_y")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    let records = h.store.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stripe_id, second.id);
    assert_eq!(records[0].stripe_price.as_deref(), Some("price_y"));
}

#[tokio::test]
async fn cancel_at_period_end_starts_the_grace_period() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    let updated = billable.subscription().cancel_at_period_end(None).await.unwrap();
    assert!(updated.cancel_at_period_end);

    let record = billable.subscription().record(None).await.unwrap();
    assert_eq!(
        record.ends_at.map(|t| t.unix_timestamp()),
        updated.current_period_end
    );

    assert!(billable.subscription().is_canceled(None).await.unwrap());
    assert!(billable.subscription().on_grace_period(None).await.unwrap());
    assert!(!billable.subscription().ended(None).await.unwrap());
    assert_eq!(
        billable.subscription().state(None).await.unwrap(),
        SubscriptionState::PendingCancellation
    );
}

#[tokio::test]
async fn cancel_requires_an_existing_record() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let err = billable.subscription().cancel_at_period_end(None).await.unwrap_err();
    assert!(matches!(err, CashierError::NotFound(_)));
}

#[tokio::test]
async fn predicates_reject_an_empty_type() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let err = billable.subscription().is_canceled(Some("")).await.unwrap_err();
    assert!(matches!(err, CashierError::InvalidArgument(_)));
}

#[tokio::test]
async fn predicates_require_an_existing_record() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    billable
        .subscribe()
        .price("price_x")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    let err = billable.subscription().on_trial(Some("premium")).await.unwrap_err();
    assert!(matches!(err, CashierError::NotFound(_)));
}

#[tokio::test]
async fn swap_leaves_exactly_one_item_at_the_new_price() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let subscription = billable
        .subscribe()
        .price("price_a")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();

    billable
        .subscription()
        .swap_item_subscription(None, "price_b")
        .await
        .unwrap();

    let remote = h.gateway.subscription(&subscription.id).unwrap();
    assert_eq!(remote.items.len(), 1);
    assert_eq!(remote.items[0].price.as_deref(), Some("price_b"));
    assert!(!remote.cancel_at_period_end);

    let record = billable.subscription().record(None).await.unwrap();
    assert_eq!(record.stripe_price.as_deref(), Some("price_b"));
    assert_eq!(record.quantity, Some(1));
    assert_eq!(
        record.ends_at.map(|t| t.unix_timestamp()),
        remote.current_period_end
    );
}

#[tokio::test]
async fn swap_requires_an_existing_record() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    let err = billable
        .subscription()
        .swap_item_subscription(None, "price_b")
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::NotFound(_)));
}

#[tokio::test]
async fn swap_failure_propagates() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    billable
        .subscribe()
        .price("price_a")
        .start(HashMap::new(), None, None)
        .await
        .unwrap();
    h.gateway.fail_on("subscription.update");

    let err = billable
        .subscription()
        .swap_item_subscription(None, "price_b")
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::RemoteApi { operation: "subscription.update", .. }));
}

#[tokio::test]
async fn start_with_new_customer_builds_the_whole_chain() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));
    h.gateway.register_payment_method("pm_card_visa", "visa", "4242");

    let subscription = billable
        .subscribe()
        .price("price_x")
        .start_with_new_customer(
            CustomerDraft::default(),
            HashMap::new(),
            "pm_card_visa",
            Some("default"),
        )
        .await
        .unwrap();

    let customer_id = billable.user().await.stripe_id.clone().unwrap();
    assert_eq!(h.directory.persisted("user-1"), Some(customer_id.clone()));

    let attached = h.gateway.payment_methods_of(&customer_id);
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].id, "pm_card_visa");

    assert!(h.gateway.subscription(&subscription.id).is_some());

    let record = billable.subscription().record(Some("default")).await.unwrap();
    assert_eq!(record.user_id, customer_id);
    assert_eq!(record.stripe_id, subscription.id);
}

#[tokio::test]
async fn start_with_new_customer_requires_a_payment_method_id() {
    let h = harness();
    let billable = h.cashier.billable(user("user-1"));

    let err = billable
        .subscribe()
        .price("price_x")
        .start_with_new_customer(CustomerDraft::default(), HashMap::new(), "", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CashierError::InvalidArgument(_)));
}

#[tokio::test]
async fn separate_types_hold_independent_subscriptions() {
    let h = harness();
    let billable = billable_with_default_method(&h, "user-1", "pm_card_visa").await;

    billable
        .subscribe()
        .price("price_main")
        .start(HashMap::new(), None, Some("default"))
        .await
        .unwrap();
    billable
        .subscribe()
        .price("price_addon")
        .start(HashMap::new(), None, Some("addon"))
        .await
        .unwrap();

    assert_eq!(billable.subscription().all().await.unwrap().len(), 2);

    billable.subscription().cancel_at_period_end(Some("addon")).await.unwrap();
    assert!(billable.subscription().is_canceled(Some("addon")).await.unwrap());
    assert!(!billable.subscription().is_canceled(Some("default")).await.unwrap());
}
