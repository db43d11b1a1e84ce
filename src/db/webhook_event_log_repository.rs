use async_trait::async_trait;

/// Ledger of webhook event ids that have already been applied, so a
/// redelivered event is acknowledged without touching subscription state.
#[async_trait]
pub trait WebhookEventLogRepository: Send + Sync {
    async fn has_processed(&self, event_id: &str) -> Result<bool, sqlx::Error>;

    async fn record(&self, event_id: &str, event_type: &str) -> Result<(), sqlx::Error>;
}
