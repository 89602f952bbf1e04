#![allow(dead_code)]

use std::sync::Arc;

use cashier::testing::{InMemorySubscriptionStore, InMemoryUserDirectory, MockGateway, TestUser};
use cashier::Cashier;

pub struct Harness {
    pub cashier: Cashier<InMemorySubscriptionStore, MockGateway, InMemoryUserDirectory>,
    pub gateway: MockGateway,
    pub store: InMemorySubscriptionStore,
    pub directory: InMemoryUserDirectory,
}

/// Wire a [`Cashier`] against the in-memory gateway and stores. The
/// returned handles share state with the cashier for assertions.
pub fn harness() -> Harness {
    let gateway = MockGateway::new();
    let store = InMemorySubscriptionStore::new();
    let directory = InMemoryUserDirectory::new();

    let cashier = Cashier::new(
        Arc::new(gateway.clone()),
        Arc::new(store.clone()),
        Arc::new(directory.clone()),
    );

    Harness {
        cashier,
        gateway,
        store,
        directory,
    }
}

pub fn user(id: &str) -> TestUser {
    TestUser::new(id, &format!("{id}@example.com"))
}
