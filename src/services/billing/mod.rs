use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod live;
pub mod mock;
pub mod sync;
pub mod webhook;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing api error: {0}")]
    Api(String),
    #[error("webhook verification failed: {0}")]
    Webhook(#[from] webhook::SignatureError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Api(err.to_string())
    }
}

/// Verified webhook event, raw payload preserved for the synchronizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    pub r#type: String,
    pub payload: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<i64>,
}

#[async_trait]
pub trait BillingService: Send + Sync {
    async fn create_customer(&self, email: &str) -> Result<String, BillingError>;

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;

    /// Billing-portal session so an existing customer can manage their
    /// plan and payment method.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError>;

    /// Fetch the subscription behind a completed checkout; updated/deleted
    /// events carry the subscription inline and never need this.
    async fn get_subscription(&self, subscription_id: &str)
        -> Result<SubscriptionInfo, BillingError>;

    /// Authenticate a raw webhook body against the signature header. Must
    /// see the exact bytes that arrived on the wire.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, BillingError>;
}
