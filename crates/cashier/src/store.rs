//! Local subscription records and the store they are persisted through

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CashierResult;

/// Subscription slot used when the caller does not name one.
pub const DEFAULT_SUBSCRIPTION_TYPE: &str = "default";

/// Locally persisted mirror of a Stripe subscription.
///
/// At most one record is current per `(user_id, type)` pair; the store
/// enforces this with a unique constraint. `user_id` is the Stripe customer
/// id of the owning user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionRecord {
    /// Assigned by the store on insert; zero until then.
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub type_: String,
    pub stripe_id: String,
    pub stripe_status: String,
    pub stripe_price: Option<String>,
    pub quantity: Option<i64>,
    pub trial_ends_at: Option<OffsetDateTime>,
    /// Non-null and in the future means a pending cancellation (grace
    /// period); in the past means the subscription has fully ended.
    pub ends_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Lifecycle state derived from a [`SubscriptionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Trialing,
    Active,
    PendingCancellation,
    Ended,
}

impl SubscriptionRecord {
    /// A cancellation has been requested, whether or not it has taken effect.
    pub fn is_canceled(&self) -> bool {
        self.ends_at.is_some()
    }

    pub fn on_grace_period_at(&self, now: OffsetDateTime) -> bool {
        self.ends_at.map(|ends_at| ends_at > now).unwrap_or(false)
    }

    pub fn on_trial_at(&self, now: OffsetDateTime) -> bool {
        self.trial_ends_at
            .map(|trial_ends_at| trial_ends_at > now)
            .unwrap_or(false)
    }

    /// Canceled and past the grace period.
    pub fn has_ended_at(&self, now: OffsetDateTime) -> bool {
        self.is_canceled() && !self.on_grace_period_at(now)
    }

    pub fn state_at(&self, now: OffsetDateTime) -> SubscriptionState {
        if self.is_canceled() {
            if self.on_grace_period_at(now) {
                SubscriptionState::PendingCancellation
            } else {
                SubscriptionState::Ended
            }
        } else if self.on_trial_at(now) {
            SubscriptionState::Trialing
        } else {
            SubscriptionState::Active
        }
    }

    pub fn on_grace_period(&self) -> bool {
        self.on_grace_period_at(OffsetDateTime::now_utc())
    }

    pub fn on_trial(&self) -> bool {
        self.on_trial_at(OffsetDateTime::now_utc())
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended_at(OffsetDateTime::now_utc())
    }

    pub fn state(&self) -> SubscriptionState {
        self.state_at(OffsetDateTime::now_utc())
    }
}

/// Persistence for [`SubscriptionRecord`]s.
///
/// A Postgres implementation is provided in [`crate::postgres`]; an
/// in-memory implementation for tests lives in [`crate::testing`].
#[allow(async_fn_in_trait)]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_user_and_type(
        &self,
        user_id: &str,
        type_: &str,
    ) -> CashierResult<Option<SubscriptionRecord>>;

    async fn find_by_user(&self, user_id: &str) -> CashierResult<Vec<SubscriptionRecord>>;

    /// Insert a new record and return it with its assigned id.
    ///
    /// A record already existing for `(user_id, type)` surfaces as
    /// [`crate::error::CashierError::Conflict`].
    async fn insert(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord>;

    /// Overwrite the Stripe fields of the record stored for the given
    /// record's `(user_id, type)` pair. `trial_ends_at` and `created_at`
    /// are left untouched. Missing record surfaces as
    /// [`crate::error::CashierError::NotFound`].
    async fn update(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord>;

    async fn delete_by_id(&self, id: i64) -> CashierResult<()>;

    async fn delete_by_stripe_id(&self, stripe_id: &str) -> CashierResult<()>;

    /// Single-column update of `ends_at`.
    async fn update_ends_at(
        &self,
        id: i64,
        ends_at: Option<OffsetDateTime>,
    ) -> CashierResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(ends_at: Option<OffsetDateTime>, trial_ends_at: Option<OffsetDateTime>) -> SubscriptionRecord {
        let now = OffsetDateTime::now_utc();
        SubscriptionRecord {
            id: 1,
            user_id: "cus_test_0".to_string(),
            type_: DEFAULT_SUBSCRIPTION_TYPE.to_string(),
            stripe_id: "sub_test_0".to_string(),
            stripe_status: "active".to_string(),
            stripe_price: Some("price_test".to_string()),
            quantity: Some(1),
            trial_ends_at,
            ends_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_ends_at_means_not_canceled() {
        let now = OffsetDateTime::now_utc();
        let record = record(None, None);

        assert!(!record.is_canceled());
        assert!(!record.on_grace_period_at(now));
        assert!(!record.has_ended_at(now));
        assert_eq!(record.state_at(now), SubscriptionState::Active);
    }

    #[test]
    fn future_ends_at_is_grace_period_not_ended() {
        let now = OffsetDateTime::now_utc();
        let record = record(Some(now + Duration::days(10)), None);

        assert!(record.is_canceled());
        assert!(record.on_grace_period_at(now));
        assert!(!record.has_ended_at(now));
        assert_eq!(record.state_at(now), SubscriptionState::PendingCancellation);
    }

    #[test]
    fn past_ends_at_is_ended() {
        let now = OffsetDateTime::now_utc();
        let record = record(Some(now - Duration::days(1)), None);

        assert!(record.is_canceled());
        assert!(!record.on_grace_period_at(now));
        assert!(record.has_ended_at(now));
        assert_eq!(record.state_at(now), SubscriptionState::Ended);
    }

    #[test]
    fn ended_always_equals_canceled_and_not_on_grace() {
        let now = OffsetDateTime::now_utc();
        let stamps = [
            None,
            Some(now - Duration::days(30)),
            Some(now + Duration::days(30)),
        ];

        for ends_at in stamps {
            for trial_ends_at in stamps {
                let record = record(ends_at, trial_ends_at);
                assert_eq!(
                    record.has_ended_at(now),
                    record.is_canceled() && !record.on_grace_period_at(now),
                    "ends_at={ends_at:?} trial_ends_at={trial_ends_at:?}"
                );
            }
        }
    }

    #[test]
    fn trial_state_follows_trial_ends_at() {
        let now = OffsetDateTime::now_utc();

        let trialing = record(None, Some(now + Duration::days(7)));
        assert!(trialing.on_trial_at(now));
        assert_eq!(trialing.state_at(now), SubscriptionState::Trialing);

        let expired = record(None, Some(now - Duration::days(7)));
        assert!(!expired.on_trial_at(now));
        assert_eq!(expired.state_at(now), SubscriptionState::Active);
    }

    #[test]
    fn cancellation_takes_precedence_over_trial() {
        let now = OffsetDateTime::now_utc();
        let record = record(Some(now + Duration::days(3)), Some(now + Duration::days(7)));

        assert_eq!(record.state_at(now), SubscriptionState::PendingCancellation);
    }
}
