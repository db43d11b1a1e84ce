use async_trait::async_trait;
use serde_json::Value;

use crate::config::StripeSettings;
use crate::services::billing::{
    webhook, BillingError, BillingEvent, BillingService, CheckoutSession, CreateCheckoutRequest,
    PortalSession, SubscriptionInfo,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com";

pub struct LiveBillingService {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl LiveBillingService {
    pub fn from_settings(settings: &StripeSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: STRIPE_API_BASE.into(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(settings: &StripeSettings, api_base: &str) -> Self {
        let mut service = Self::from_settings(settings);
        service.api_base = api_base.trim_end_matches('/').to_string();
        service
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, BillingError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, BillingError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, BillingError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| BillingError::Serde(err.to_string()))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BillingError::NotFound(error_message(&body)));
        }
        if !status.is_success() {
            return Err(BillingError::Api(error_message(&body)));
        }
        Ok(body)
    }
}

fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unexpected billing api response")
        .to_string()
}

fn require_str(value: &Value, key: &str) -> Result<String, BillingError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BillingError::Serde(format!("missing field `{key}`")))
}

pub(crate) fn subscription_from_json(object: &Value) -> Result<SubscriptionInfo, BillingError> {
    Ok(SubscriptionInfo {
        id: require_str(object, "id")?,
        customer_id: require_str(object, "customer")?,
        status: require_str(object, "status")?,
        price_id: object
            .pointer("/items/data/0/price/id")
            .and_then(Value::as_str)
            .map(str::to_string),
        current_period_end: object.get("current_period_end").and_then(Value::as_i64),
    })
}

#[async_trait]
impl BillingService for LiveBillingService {
    async fn create_customer(&self, email: &str) -> Result<String, BillingError> {
        let body = self
            .post_form("/v1/customers", &[("email", email)])
            .await?;
        require_str(&body, "id")
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let body = self
            .post_form(
                "/v1/checkout/sessions",
                &[
                    ("mode", "subscription"),
                    ("customer", &req.customer_id),
                    ("line_items[0][price]", &req.price_id),
                    ("line_items[0][quantity]", "1"),
                    ("success_url", &req.success_url),
                    ("cancel_url", &req.cancel_url),
                ],
            )
            .await?;

        Ok(CheckoutSession {
            id: require_str(&body, "id")?,
            url: body.get("url").and_then(Value::as_str).map(str::to_string),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        let body = self
            .post_form(
                "/v1/billing_portal/sessions",
                &[("customer", customer_id), ("return_url", return_url)],
            )
            .await?;

        Ok(PortalSession {
            id: require_str(&body, "id")?,
            url: require_str(&body, "url")?,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, BillingError> {
        let body = self
            .get(&format!("/v1/subscriptions/{subscription_id}"))
            .await?;
        subscription_from_json(&body)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, BillingError> {
        Ok(webhook::verify(payload, signature_header, &self.webhook_secret)?)
    }
}
