use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::subscription_repository::{BillingState, SubscriptionRepository};
use crate::models::subscription::SubscriptionRecord;

#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pub pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT user_id, stripe_customer_id, stripe_subscription_id,
                   tier, status, current_period_end
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT user_id, stripe_customer_id, stripe_subscription_id,
                   tier, status, current_period_end
            FROM subscriptions
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(stripe_customer_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn bind_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<SubscriptionRecord, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            INSERT INTO subscriptions (user_id, stripe_customer_id, tier, status)
            VALUES ($1, $2, 'free', 'active')
            ON CONFLICT (user_id)
            DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id
            RETURNING user_id, stripe_customer_id, stripe_subscription_id,
                      tier, status, current_period_end
            "#,
        )
        .bind(user_id)
        .bind(stripe_customer_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn apply_billing_state(
        &self,
        state: BillingState,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            UPDATE subscriptions
            SET stripe_subscription_id = $2,
                tier = $3,
                status = $4,
                current_period_end = $5
            WHERE stripe_customer_id = $1
            RETURNING user_id, stripe_customer_id, stripe_subscription_id,
                      tier, status, current_period_end
            "#,
        )
        .bind(&state.stripe_customer_id)
        .bind(&state.stripe_subscription_id)
        .bind(state.tier)
        .bind(&state.status)
        .bind(state.current_period_end)
        .fetch_optional(&self.pool)
        .await
    }
}
