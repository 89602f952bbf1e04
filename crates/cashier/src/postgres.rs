//! Postgres-backed subscription store

use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{CashierError, CashierResult};
use crate::store::{SubscriptionRecord, SubscriptionStore};

/// [`SubscriptionStore`] backed by a `subscriptions` table.
///
/// The table carries a unique index on `(user_id, type)`; concurrent
/// inserts for the same pair surface as a conflict error instead of a
/// duplicate row. See `migrations/0001_create_subscriptions.sql`.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SubscriptionStore for PgSubscriptionStore {
    async fn find_by_user_and_type(
        &self,
        user_id: &str,
        type_: &str,
    ) -> CashierResult<Option<SubscriptionRecord>> {
        let record: Option<SubscriptionRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, "type", stripe_id, stripe_status, stripe_price, quantity,
                   trial_ends_at, ends_at, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1 AND "type" = $2
            "#,
        )
        .bind(user_id)
        .bind(type_)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_user(&self, user_id: &str) -> CashierResult<Vec<SubscriptionRecord>> {
        let records: Vec<SubscriptionRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, "type", stripe_id, stripe_status, stripe_price, quantity,
                   trial_ends_at, ends_at, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn insert(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord> {
        let inserted: SubscriptionRecord = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (user_id, "type", stripe_id, stripe_status, stripe_price, quantity,
                 trial_ends_at, ends_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING id, user_id, "type", stripe_id, stripe_status, stripe_price, quantity,
                      trial_ends_at, ends_at, created_at, updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.type_)
        .bind(&record.stripe_id)
        .bind(&record.stripe_status)
        .bind(&record.stripe_price)
        .bind(record.quantity)
        .bind(record.trial_ends_at)
        .bind(record.ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => CashierError::Conflict(
                format!(
                    "subscription already exists for user {} and type {}",
                    record.user_id, record.type_
                ),
            ),
            _ => CashierError::from(e),
        })?;

        Ok(inserted)
    }

    async fn update(&self, record: SubscriptionRecord) -> CashierResult<SubscriptionRecord> {
        let updated: Option<SubscriptionRecord> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET stripe_id = $3,
                stripe_status = $4,
                stripe_price = $5,
                quantity = $6,
                ends_at = $7,
                updated_at = NOW()
            WHERE user_id = $1 AND "type" = $2
            RETURNING id, user_id, "type", stripe_id, stripe_status, stripe_price, quantity,
                      trial_ends_at, ends_at, created_at, updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.type_)
        .bind(&record.stripe_id)
        .bind(&record.stripe_status)
        .bind(&record.stripe_price)
        .bind(record.quantity)
        .bind(record.ends_at)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            CashierError::NotFound(format!(
                "no subscription for user {} and type {}",
                record.user_id, record.type_
            ))
        })
    }

    async fn delete_by_id(&self, id: i64) -> CashierResult<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_by_stripe_id(&self, stripe_id: &str) -> CashierResult<()> {
        sqlx::query("DELETE FROM subscriptions WHERE stripe_id = $1")
            .bind(stripe_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_ends_at(
        &self,
        id: i64,
        ends_at: Option<OffsetDateTime>,
    ) -> CashierResult<()> {
        sqlx::query("UPDATE subscriptions SET ends_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(ends_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
