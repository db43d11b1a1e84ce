use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::integration_repository::{IntegrationRepository, NewIntegration};
use crate::db::subscription_repository::{BillingState, SubscriptionRepository};
use crate::db::webhook_event_log_repository::WebhookEventLogRepository;
use crate::models::integration::{IntegrationProvider, IntegrationRecord};
use crate::models::subscription::{SubscriptionRecord, SubscriptionTier};

#[derive(Default)]
pub struct MockIntegrationRepo {
    pub records: Mutex<HashMap<(Uuid, IntegrationProvider), IntegrationRecord>>,
    pub should_fail: bool,
    pub upsert_calls: Mutex<usize>,
}

impl MockIntegrationRepo {
    fn fail(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock db failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IntegrationRepository for MockIntegrationRepo {
    async fn upsert(&self, integration: NewIntegration) -> Result<IntegrationRecord, sqlx::Error> {
        self.fail()?;
        *self.upsert_calls.lock().unwrap() += 1;

        let mut records = self.records.lock().unwrap();
        let key = (integration.user_id, integration.provider);
        let now = OffsetDateTime::now_utc();

        let record = match records.get(&key) {
            Some(existing) => IntegrationRecord {
                user_id: integration.user_id,
                provider: integration.provider,
                access_token: integration.access_token,
                refresh_token: integration
                    .refresh_token
                    .or_else(|| existing.refresh_token.clone()),
                expires_at: integration.expires_at,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => IntegrationRecord {
                user_id: integration.user_id,
                provider: integration.provider,
                access_token: integration.access_token,
                refresh_token: integration.refresh_token,
                expires_at: integration.expires_at,
                created_at: now,
                updated_at: now,
            },
        };

        records.insert(key, record.clone());
        Ok(record)
    }

    async fn find(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>, sqlx::Error> {
        self.fail()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(user_id, provider))
            .cloned())
    }

    async fn delete(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<bool, sqlx::Error> {
        self.fail()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .remove(&(user_id, provider))
            .is_some())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<IntegrationRecord>, sqlx::Error> {
        self.fail()?;
        let mut rows: Vec<IntegrationRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.provider.as_str());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MockSubscriptionRepo {
    pub records: Mutex<Vec<SubscriptionRecord>>,
    pub should_fail: bool,
    pub apply_calls: Mutex<usize>,
}

impl MockSubscriptionRepo {
    fn fail(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock db failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepo {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        self.fail()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned())
    }

    async fn find_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        self.fail()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.stripe_customer_id == stripe_customer_id)
            .cloned())
    }

    async fn bind_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<SubscriptionRecord, sqlx::Error> {
        self.fail()?;
        let mut records = self.records.lock().unwrap();

        if let Some(existing) = records.iter_mut().find(|r| r.user_id == user_id) {
            existing.stripe_customer_id = stripe_customer_id.to_string();
            return Ok(existing.clone());
        }

        let record = SubscriptionRecord {
            user_id,
            stripe_customer_id: stripe_customer_id.to_string(),
            stripe_subscription_id: None,
            tier: SubscriptionTier::Free,
            status: "active".into(),
            current_period_end: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn apply_billing_state(
        &self,
        state: BillingState,
    ) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
        self.fail()?;
        *self.apply_calls.lock().unwrap() += 1;

        let mut records = self.records.lock().unwrap();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.stripe_customer_id == state.stripe_customer_id)
        else {
            return Ok(None);
        };

        record.stripe_subscription_id = state.stripe_subscription_id;
        record.tier = state.tier;
        record.status = state.status;
        record.current_period_end = state.current_period_end;
        Ok(Some(record.clone()))
    }
}

#[derive(Default)]
pub struct MockWebhookEventLogRepo {
    pub seen: Mutex<HashSet<String>>,
    pub should_fail: bool,
}

#[async_trait]
impl WebhookEventLogRepository for MockWebhookEventLogRepo {
    async fn has_processed(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock db failure".into()));
        }
        Ok(self.seen.lock().unwrap().contains(event_id))
    }

    async fn record(&self, event_id: &str, _event_type: &str) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock db failure".into()));
        }
        self.seen.lock().unwrap().insert(event_id.to_string());
        Ok(())
    }
}
