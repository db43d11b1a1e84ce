use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::services::billing::{
    webhook, BillingError, BillingEvent, BillingService, CheckoutSession, CreateCheckoutRequest,
    PortalSession, SubscriptionInfo,
};

/// In-memory billing backend for tests: captures requests, serves a
/// configurable subscription, and verifies webhooks with a fixed secret.
#[derive(Clone, Default)]
pub struct MockBillingService {
    pub webhook_secret: String,
    pub created_customers: Arc<Mutex<Vec<String>>>,
    pub checkout_requests: Arc<Mutex<Vec<CreateCheckoutRequest>>>,
    pub portal_requests: Arc<Mutex<Vec<(String, String)>>>,
    pub subscription: Arc<Mutex<Option<SubscriptionInfo>>>,
}

impl MockBillingService {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            ..Self::default()
        }
    }

    pub fn with_subscription(self, subscription: SubscriptionInfo) -> Self {
        *self.subscription.lock().unwrap() = Some(subscription);
        self
    }
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{prefix}_{ts}")
}

#[async_trait]
impl BillingService for MockBillingService {
    async fn create_customer(&self, email: &str) -> Result<String, BillingError> {
        let id = make_id("cus_test");
        self.created_customers
            .lock()
            .unwrap()
            .push(email.to_string());
        Ok(id)
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        self.checkout_requests.lock().unwrap().push(req);
        Ok(CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://checkout.example.test/session".into()),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        self.portal_requests
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));
        Ok(PortalSession {
            id: make_id("bps_test"),
            url: "https://portal.example.test/session".into(),
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, BillingError> {
        self.subscription
            .lock()
            .unwrap()
            .clone()
            .filter(|sub| sub.id == subscription_id)
            .ok_or_else(|| BillingError::NotFound(subscription_id.to_string()))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, BillingError> {
        Ok(webhook::verify(
            payload,
            signature_header,
            &self.webhook_secret,
        )?)
    }
}
