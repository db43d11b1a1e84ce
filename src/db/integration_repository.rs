use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::integration::{IntegrationProvider, IntegrationRecord};

/// Credentials produced by a completed authorization or refresh, ready to
/// be persisted for a `(user, provider)` pair.
#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub user_id: Uuid,
    pub provider: IntegrationProvider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    /// Insert or update the stored credential for `(user_id, provider)`.
    ///
    /// A `None` refresh token must not clobber a previously stored one:
    /// several providers only issue the refresh token on the first grant.
    async fn upsert(&self, integration: NewIntegration) -> Result<IntegrationRecord, sqlx::Error>;

    async fn find(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>, sqlx::Error>;

    /// Remove the stored credential. Returns whether a row existed.
    async fn delete(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<bool, sqlx::Error>;

    /// Providers the user currently has a credential for, for the
    /// connection-status listing.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<IntegrationRecord>, sqlx::Error>;
}
