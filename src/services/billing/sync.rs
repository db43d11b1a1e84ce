use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::StripeSettings;
use crate::db::subscription_repository::{BillingState, SubscriptionRepository};
use crate::db::webhook_event_log_repository::WebhookEventLogRepository;
use crate::models::subscription::SubscriptionTier;
use crate::services::billing::live::subscription_from_json;
use crate::services::billing::{BillingError, BillingEvent, BillingService, SubscriptionInfo};

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const EVENT_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Static price-id to tier mapping. Total: anything unrecognized is `Free`,
/// so replaying an event can never produce a different answer.
#[derive(Clone)]
pub struct PriceTierMap {
    standard: String,
    pro: String,
}

impl PriceTierMap {
    pub fn from_settings(settings: &StripeSettings) -> Self {
        Self {
            standard: settings.price_standard.clone(),
            pro: settings.price_pro.clone(),
        }
    }

    pub fn tier_for(&self, price_id: Option<&str>) -> SubscriptionTier {
        match price_id {
            Some(id) if !self.pro.is_empty() && id == self.pro => SubscriptionTier::Pro,
            Some(id) if !self.standard.is_empty() && id == self.standard => {
                SubscriptionTier::Standard
            }
            _ => SubscriptionTier::Free,
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("event {event_id} is missing {field}")]
    MalformedEvent {
        event_id: String,
        field: &'static str,
    },
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Applies verified billing events to the subscription ledger. Every event
/// kind reduces to the same unconditional upsert of a state computed purely
/// from the event, so redelivery is harmless.
pub struct SubscriptionSynchronizer {
    billing: Arc<dyn BillingService>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    event_log: Arc<dyn WebhookEventLogRepository>,
    price_map: PriceTierMap,
}

impl SubscriptionSynchronizer {
    pub fn new(
        billing: Arc<dyn BillingService>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        event_log: Arc<dyn WebhookEventLogRepository>,
        price_map: PriceTierMap,
    ) -> Self {
        Self {
            billing,
            subscriptions,
            event_log,
            price_map,
        }
    }

    pub async fn apply(&self, event: &BillingEvent) -> Result<(), SyncError> {
        if self.event_log.has_processed(&event.id).await? {
            debug!(event_id = %event.id, "duplicate webhook delivery, skipping");
            return Ok(());
        }

        match event.r#type.as_str() {
            EVENT_CHECKOUT_COMPLETED => self.apply_checkout(event).await?,
            EVENT_SUBSCRIPTION_UPDATED => {
                let sub = self.event_subscription(event)?;
                self.upsert_state(event, &sub, &sub.status).await?;
            }
            EVENT_SUBSCRIPTION_DELETED => {
                let sub = self.event_subscription(event)?;
                self.upsert_state(event, &sub, "canceled").await?;
            }
            other => {
                debug!(event_id = %event.id, r#type = other, "ignoring unhandled event type");
            }
        }

        self.event_log.record(&event.id, &event.r#type).await?;
        Ok(())
    }

    async fn apply_checkout(&self, event: &BillingEvent) -> Result<(), SyncError> {
        let session = self.event_object(event)?;
        let subscription_id = session
            .get("subscription")
            .and_then(Value::as_str)
            .ok_or(SyncError::MalformedEvent {
                event_id: event.id.clone(),
                field: "data.object.subscription",
            })?;

        // The checkout session only names the subscription; the tier lives
        // on the subscription's line items.
        let sub = self.billing.get_subscription(subscription_id).await?;
        self.upsert_state(event, &sub, &sub.status).await
    }

    fn event_object<'a>(&self, event: &'a BillingEvent) -> Result<&'a Value, SyncError> {
        event
            .payload
            .pointer("/data/object")
            .ok_or(SyncError::MalformedEvent {
                event_id: event.id.clone(),
                field: "data.object",
            })
    }

    fn event_subscription(&self, event: &BillingEvent) -> Result<SubscriptionInfo, SyncError> {
        let object = self.event_object(event)?;
        subscription_from_json(object).map_err(|_| SyncError::MalformedEvent {
            event_id: event.id.clone(),
            field: "data.object (subscription)",
        })
    }

    async fn upsert_state(
        &self,
        event: &BillingEvent,
        sub: &SubscriptionInfo,
        status: &str,
    ) -> Result<(), SyncError> {
        let tier = self.price_map.tier_for(sub.price_id.as_deref());
        let state = BillingState {
            stripe_customer_id: sub.customer_id.clone(),
            stripe_subscription_id: Some(sub.id.clone()),
            tier,
            status: status.to_string(),
            current_period_end: sub
                .current_period_end
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()),
        };

        match self.subscriptions.apply_billing_state(state).await? {
            Some(record) => {
                info!(
                    event_id = %event.id,
                    customer = %sub.customer_id,
                    tier = record.tier.as_str(),
                    status = %record.status,
                    "subscription state applied"
                );
            }
            None => {
                // No local row for this customer; nothing to reconcile.
                warn!(event_id = %event.id, customer = %sub.customer_id, "no subscription row for customer");
            }
        }
        Ok(())
    }
}
