use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::webhook_event_log_repository::WebhookEventLogRepository;

#[derive(Clone)]
pub struct PostgresWebhookEventLogRepository {
    pub pool: PgPool,
}

impl PostgresWebhookEventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventLogRepository for PostgresWebhookEventLogRepository {
    async fn has_processed(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT event_id FROM webhook_event_log WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    async fn record(&self, event_id: &str, event_type: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO webhook_event_log (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
