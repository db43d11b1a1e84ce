use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Feature-entitlement level derived from billing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Standard,
    Pro,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Standard => "standard",
            SubscriptionTier::Pro => "pro",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "free" => Some(SubscriptionTier::Free),
            "standard" => Some(SubscriptionTier::Standard),
            "pro" => Some(SubscriptionTier::Pro),
            _ => None,
        }
    }
}

/// Durable billing-state ledger for one user. Created lazily on first
/// checkout, never deleted, and mutated only by the subscription
/// synchronizer in response to verified webhook events.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub tier: SubscriptionTier,
    pub status: String,
    pub current_period_end: Option<OffsetDateTime>,
}
