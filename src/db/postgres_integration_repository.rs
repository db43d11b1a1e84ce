use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::integration_repository::{IntegrationRepository, NewIntegration};
use crate::models::integration::{IntegrationProvider, IntegrationRecord};

#[derive(Clone)]
pub struct PostgresIntegrationRepository {
    pub pool: PgPool,
}

impl PostgresIntegrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationRepository for PostgresIntegrationRepository {
    async fn upsert(&self, integration: NewIntegration) -> Result<IntegrationRecord, sqlx::Error> {
        sqlx::query_as::<_, IntegrationRecord>(
            r#"
            INSERT INTO integrations (user_id, provider, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, provider)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, integrations.refresh_token),
                expires_at = EXCLUDED.expires_at,
                updated_at = now()
            RETURNING user_id, provider, access_token, refresh_token, expires_at,
                      created_at, updated_at
            "#,
        )
        .bind(integration.user_id)
        .bind(integration.provider)
        .bind(&integration.access_token)
        .bind(&integration.refresh_token)
        .bind(integration.expires_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn find(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>, sqlx::Error> {
        sqlx::query_as::<_, IntegrationRecord>(
            r#"
            SELECT user_id, provider, access_token, refresh_token, expires_at,
                   created_at, updated_at
            FROM integrations
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM integrations
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<IntegrationRecord>, sqlx::Error> {
        sqlx::query_as::<_, IntegrationRecord>(
            r#"
            SELECT user_id, provider, access_token, refresh_token, expires_at,
                   created_at, updated_at
            FROM integrations
            WHERE user_id = $1
            ORDER BY provider
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
