use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::subscription::{SubscriptionRecord, SubscriptionTier};
use crate::responses::JsonResponse;
use crate::session::AuthSession;
use crate::state::AppState;
use crate::services::billing::sync::SyncError;
use crate::services::billing::CreateCheckoutRequest;

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub tier: String,
}

fn session_user_id(session: &AuthSession) -> Result<Uuid, Response> {
    Uuid::parse_str(&session.0.id)
        .map_err(|_| JsonResponse::unauthorized("Invalid session").into_response())
}

fn subscription_json(record: &SubscriptionRecord) -> serde_json::Value {
    serde_json::json!({
        "tier": record.tier,
        "status": record.status,
        "currentPeriodEnd": record
            .current_period_end
            .map(|t| t.unix_timestamp()),
    })
}

// GET /api/subscriptions
pub async fn get_subscription(
    session: AuthSession,
    State(state): State<AppState>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.subscriptions.find_by_user(user_id).await {
        // No row yet means the user never started checkout: free tier.
        Ok(None) => Json(serde_json::json!({
            "tier": SubscriptionTier::Free,
            "status": "active",
            "currentPeriodEnd": null,
        }))
        .into_response(),
        Ok(Some(record)) => Json(subscription_json(&record)).into_response(),
        Err(err) => {
            error!(%user_id, ?err, "failed to load subscription");
            JsonResponse::server_error("Failed to load subscription").into_response()
        }
    }
}

// POST /api/subscriptions/checkout
pub async fn create_checkout(
    session: AuthSession,
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let price_id = match body.tier.as_str() {
        "standard" => state.config.stripe.price_standard.clone(),
        "pro" => state.config.stripe.price_pro.clone(),
        _ => return JsonResponse::bad_request("Unknown tier").into_response(),
    };
    if price_id.is_empty() {
        return JsonResponse::server_error("Tier is not purchasable").into_response();
    }

    // Reuse the existing billing customer when there is one, otherwise
    // create it and bind the subscription row before checkout begins.
    let customer_id = match state.subscriptions.find_by_user(user_id).await {
        Ok(Some(record)) => record.stripe_customer_id,
        Ok(None) => {
            let customer_id = match state.billing.create_customer(&session.0.email).await {
                Ok(id) => id,
                Err(err) => {
                    error!(%user_id, ?err, "failed to create billing customer");
                    return JsonResponse::server_error("Failed to start checkout")
                        .into_response();
                }
            };
            if let Err(err) = state
                .subscriptions
                .bind_customer(user_id, &customer_id)
                .await
            {
                error!(%user_id, ?err, "failed to bind billing customer");
                return JsonResponse::server_error("Failed to start checkout").into_response();
            }
            customer_id
        }
        Err(err) => {
            error!(%user_id, ?err, "failed to load subscription for checkout");
            return JsonResponse::server_error("Failed to start checkout").into_response();
        }
    };

    let frontend = &state.config.frontend_origin;
    let request = CreateCheckoutRequest {
        customer_id,
        price_id,
        success_url: format!("{frontend}/billing?checkout=success"),
        cancel_url: format!("{frontend}/billing?checkout=cancelled"),
    };

    match state.billing.create_checkout_session(request).await {
        Ok(session) => Json(serde_json::json!({ "url": session.url })).into_response(),
        Err(err) => {
            error!(%user_id, ?err, "failed to create checkout session");
            JsonResponse::server_error("Failed to start checkout").into_response()
        }
    }
}

// POST /api/subscriptions/portal
pub async fn create_portal(
    session: AuthSession,
    State(state): State<AppState>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let record = match state.subscriptions.find_by_user(user_id).await {
        Ok(Some(record)) => record,
        // Portal sessions only exist for customers; checkout creates one.
        Ok(None) => return JsonResponse::not_found("No subscription").into_response(),
        Err(err) => {
            error!(%user_id, ?err, "failed to load subscription for portal");
            return JsonResponse::server_error("Failed to open billing portal").into_response();
        }
    };

    let return_url = format!("{}/billing", state.config.frontend_origin);
    match state
        .billing
        .create_portal_session(&record.stripe_customer_id, &return_url)
        .await
    {
        Ok(portal) => Json(serde_json::json!({ "url": portal.url })).into_response(),
        Err(err) => {
            error!(%user_id, ?err, "failed to create portal session");
            JsonResponse::server_error("Failed to open billing portal").into_response()
        }
    }
}

// POST /api/subscriptions/webhook
//
// Signature-authenticated, so no session. A 4xx here makes the billing
// provider retry with its own backoff; the handler never retries itself.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let signature = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let event = match state.billing.verify_webhook(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            warn!(?err, "webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    match state.synchronizer.apply(&event).await {
        Ok(()) => Json(serde_json::json!({ "received": true })).into_response(),
        Err(SyncError::MalformedEvent { .. }) => {
            warn!(event_id = %event.id, "malformed webhook event");
            (StatusCode::BAD_REQUEST, "malformed event").into_response()
        }
        Err(err) => {
            error!(event_id = %event.id, ?err, "failed to apply webhook event");
            JsonResponse::server_error("Failed to process event").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::mock_db::{MockIntegrationRepo, MockSubscriptionRepo, MockWebhookEventLogRepo};
    use crate::services::billing::mock::MockBillingService;
    use crate::services::billing::sync::{
        PriceTierMap, SubscriptionSynchronizer, EVENT_SUBSCRIPTION_UPDATED,
    };
    use crate::services::billing::webhook::sign_for_tests;
    use crate::services::oauth::integration_service::IntegrationService;
    use crate::services::oauth::registry::ProviderRegistry;
    use crate::services::oauth::token_client::TokenExchangeClient;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn app_state(
        billing: MockBillingService,
        subscriptions: Arc<MockSubscriptionRepo>,
    ) -> AppState {
        let config = Arc::new(test_config());
        let billing: Arc<dyn crate::services::billing::BillingService> = Arc::new(billing);
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        let integrations = Arc::new(IntegrationService::new(
            registry,
            TokenExchangeClient::new(config.backend_url.clone()),
            Arc::new(MockIntegrationRepo::default()),
            config.oauth.state_secret.clone(),
        ));
        let synchronizer = Arc::new(SubscriptionSynchronizer::new(
            billing.clone(),
            subscriptions.clone(),
            Arc::new(MockWebhookEventLogRepo::default()),
            PriceTierMap::from_settings(&config.stripe),
        ));
        AppState {
            config,
            integrations,
            subscriptions,
            billing,
            synchronizer,
        }
    }

    fn subscription_body(price: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": EVENT_SUBSCRIPTION_UPDATED,
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "current_period_end": 1_767_225_600,
                "items": { "data": [ { "price": { "id": price } } ] }
            } }
        }))
        .unwrap()
    }

    fn seeded_subscriptions() -> Arc<MockSubscriptionRepo> {
        let repo = MockSubscriptionRepo::default();
        repo.records.lock().unwrap().push(SubscriptionRecord {
            user_id: Uuid::new_v4(),
            stripe_customer_id: "cus_1".into(),
            stripe_subscription_id: None,
            tier: SubscriptionTier::Free,
            status: "active".into(),
            current_period_end: None,
        });
        Arc::new(repo)
    }

    fn session_for(user_id: Uuid) -> AuthSession {
        AuthSession(crate::utils::jwt::Claims {
            id: user_id.to_string(),
            email: "test@example.com".into(),
            exp: (OffsetDateTime::now_utc().unix_timestamp() + 3600) as usize,
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn first_checkout_creates_and_binds_customer() {
        let billing = MockBillingService::new("whsec_test_secret");
        let repo = Arc::new(MockSubscriptionRepo::default());
        let state = app_state(billing.clone(), repo.clone());
        let user_id = Uuid::new_v4();

        let response = create_checkout(
            session_for(user_id),
            State(state),
            Json(CheckoutBody {
                tier: "pro".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["url"].is_string());

        assert_eq!(
            *billing.created_customers.lock().unwrap(),
            vec!["test@example.com".to_string()]
        );

        let checkout_requests = billing.checkout_requests.lock().unwrap();
        assert_eq!(checkout_requests.len(), 1);
        assert_eq!(checkout_requests[0].price_id, "price_pro_test");

        // The subscription row is bound to the new customer before the
        // checkout session is created.
        let records = repo.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, user_id);
        assert_eq!(
            records[0].stripe_customer_id,
            checkout_requests[0].customer_id
        );
        assert_eq!(records[0].tier, SubscriptionTier::Free);
    }

    #[tokio::test]
    async fn second_checkout_reuses_stored_customer() {
        let billing = MockBillingService::new("whsec_test_secret");
        let repo = Arc::new(MockSubscriptionRepo::default());
        let user_id = Uuid::new_v4();
        repo.records.lock().unwrap().push(SubscriptionRecord {
            user_id,
            stripe_customer_id: "cus_existing".into(),
            stripe_subscription_id: None,
            tier: SubscriptionTier::Free,
            status: "active".into(),
            current_period_end: None,
        });
        let state = app_state(billing.clone(), repo);

        let response = create_checkout(
            session_for(user_id),
            State(state),
            Json(CheckoutBody {
                tier: "standard".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        assert!(billing.created_customers.lock().unwrap().is_empty());
        let checkout_requests = billing.checkout_requests.lock().unwrap();
        assert_eq!(checkout_requests[0].customer_id, "cus_existing");
        assert_eq!(checkout_requests[0].price_id, "price_standard_test");
    }

    #[tokio::test]
    async fn checkout_with_unknown_tier_is_rejected() {
        let billing = MockBillingService::new("whsec_test_secret");
        let state = app_state(billing.clone(), Arc::new(MockSubscriptionRepo::default()));

        let response = create_checkout(
            session_for(Uuid::new_v4()),
            State(state),
            Json(CheckoutBody {
                tier: "platinum".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(billing.checkout_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_read_defaults_to_free() {
        let state = app_state(
            MockBillingService::new("whsec_test_secret"),
            Arc::new(MockSubscriptionRepo::default()),
        );

        let response = get_subscription(session_for(Uuid::new_v4()), State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["tier"], "free");
        assert_eq!(json["status"], "active");
        assert!(json["currentPeriodEnd"].is_null());
    }

    #[tokio::test]
    async fn subscription_read_returns_stored_state() {
        let repo = Arc::new(MockSubscriptionRepo::default());
        let user_id = Uuid::new_v4();
        repo.records.lock().unwrap().push(SubscriptionRecord {
            user_id,
            stripe_customer_id: "cus_1".into(),
            stripe_subscription_id: Some("sub_1".into()),
            tier: SubscriptionTier::Pro,
            status: "active".into(),
            current_period_end: OffsetDateTime::from_unix_timestamp(1_767_225_600).ok(),
        });
        let state = app_state(MockBillingService::new("whsec_test_secret"), repo);

        let response = get_subscription(session_for(user_id), State(state)).await;
        let json = body_json(response).await;
        assert_eq!(json["tier"], "pro");
        assert_eq!(json["currentPeriodEnd"], 1_767_225_600);
    }

    #[tokio::test]
    async fn portal_opens_for_existing_customer() {
        let billing = MockBillingService::new("whsec_test_secret");
        let repo = Arc::new(MockSubscriptionRepo::default());
        let user_id = Uuid::new_v4();
        repo.records.lock().unwrap().push(SubscriptionRecord {
            user_id,
            stripe_customer_id: "cus_1".into(),
            stripe_subscription_id: Some("sub_1".into()),
            tier: SubscriptionTier::Pro,
            status: "active".into(),
            current_period_end: None,
        });
        let state = app_state(billing.clone(), repo);

        let response = create_portal(session_for(user_id), State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["url"].is_string());

        let portal_requests = billing.portal_requests.lock().unwrap();
        assert_eq!(portal_requests.len(), 1);
        assert_eq!(portal_requests[0].0, "cus_1");
        assert!(portal_requests[0].1.ends_with("/billing"));
    }

    #[tokio::test]
    async fn portal_without_subscription_is_not_found() {
        let billing = MockBillingService::new("whsec_test_secret");
        let state = app_state(billing.clone(), Arc::new(MockSubscriptionRepo::default()));

        let response = create_portal(session_for(Uuid::new_v4()), State(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(billing.portal_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_applies_signed_event() {
        let repo = seeded_subscriptions();
        let state = app_state(MockBillingService::new("whsec_test_secret"), repo.clone());

        let body = subscription_body("price_pro_test");
        let header = sign_for_tests(
            "whsec_test_secret",
            OffsetDateTime::now_utc().unix_timestamp(),
            &body,
        );

        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", header.parse().unwrap());

        let response = webhook(State(state), headers, body.into()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let records = repo.records.lock().unwrap();
        assert_eq!(records[0].tier, SubscriptionTier::Pro);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_never_reaches_synchronizer() {
        let repo = seeded_subscriptions();
        let state = app_state(MockBillingService::new("whsec_test_secret"), repo.clone());

        let body = subscription_body("price_pro_test");
        let header = sign_for_tests(
            "whsec_wrong_secret",
            OffsetDateTime::now_utc().unix_timestamp(),
            &body,
        );

        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", header.parse().unwrap());

        let response = webhook(State(state), headers, body.into()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let records = repo.records.lock().unwrap();
        assert_eq!(records[0].tier, SubscriptionTier::Free);
        assert_eq!(*repo.apply_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn webhook_without_signature_header_is_rejected() {
        let state = app_state(
            MockBillingService::new("whsec_test_secret"),
            seeded_subscriptions(),
        );

        let body = subscription_body("price_pro_test");
        let response = webhook(State(state), HeaderMap::new(), body.into()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
