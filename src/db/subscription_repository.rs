use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::subscription::{SubscriptionRecord, SubscriptionTier};

/// Billing state derived from a webhook event, applied to the row keyed by
/// the Stripe customer id.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingState {
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub tier: SubscriptionTier,
    pub status: String,
    pub current_period_end: Option<OffsetDateTime>,
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, sqlx::Error>;

    async fn find_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error>;

    /// Ensure the user has a subscription row bound to the given customer id
    /// before checkout begins. An existing row keeps its tier and status and
    /// only picks up the customer id.
    async fn bind_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<SubscriptionRecord, sqlx::Error>;

    /// Overwrite the billing fields of the row matching the customer id.
    /// Applying the same state twice must leave the row unchanged.
    async fn apply_billing_state(
        &self,
        state: BillingState,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error>;
}
