use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Url;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::integration_repository::{IntegrationRepository, NewIntegration};
use crate::models::integration::{IntegrationProvider, IntegrationRecord};
use crate::services::oauth::registry::ProviderRegistry;
use crate::services::oauth::state_token::{self, StateTokenError};
use crate::services::oauth::token_client::{TokenExchangeClient, TokenExchangeError};

/// Refresh this far ahead of expiry so a token handed to a caller is not
/// already stale by the time it reaches the provider.
const EXPIRY_LEEWAY: Duration = Duration::seconds(60);

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    InvalidState(#[from] StateTokenError),
    #[error("state token was issued for a different provider")]
    ProviderMismatch,
    #[error(transparent)]
    Exchange(#[from] TokenExchangeError),
    #[error("malformed authorization endpoint: {0}")]
    BadAuthorizationEndpoint(#[from] url::ParseError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AccessTokenError {
    #[error("no {0} integration connected")]
    NotConnected(IntegrationProvider),
    #[error("{0} integration requires reauthorization")]
    ReauthorizationRequired(IntegrationProvider),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Orchestrates the authorization-code flow and the stored-credential
/// lifecycle for every provider.
pub struct IntegrationService {
    registry: Arc<ProviderRegistry>,
    token_client: TokenExchangeClient,
    repo: Arc<dyn IntegrationRepository>,
    state_secret: String,
    /// Per-(user, provider) guard so concurrent callers near expiry
    /// coalesce into a single refresh.
    refresh_guards: DashMap<(Uuid, IntegrationProvider), Arc<Mutex<()>>>,
}

impl IntegrationService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        token_client: TokenExchangeClient,
        repo: Arc<dyn IntegrationRepository>,
        state_secret: String,
    ) -> Self {
        Self {
            registry,
            token_client,
            repo,
            state_secret,
            refresh_guards: DashMap::new(),
        }
    }

    /// Build the provider's authorization URL, carrying the caller's
    /// identity in a signed state parameter.
    pub fn begin(&self, user_id: Uuid, provider: IntegrationProvider) -> Result<String, FlowError> {
        let config = self.registry.get(provider);
        let state = state_token::encode(&self.state_secret, user_id, provider);
        let redirect_uri = self.token_client.redirect_uri(provider);

        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", &config.client_id),
            ("redirect_uri", &redirect_uri),
            ("response_type", "code"),
        ];
        let scope = config.scope_param();
        if !scope.is_empty() {
            params.push(("scope", &scope));
        }
        params.extend(config.extra_authorize_params.iter().copied());
        params.push(("state", &state));

        let url = Url::parse_with_params(&config.authorization_endpoint, &params)?;
        Ok(url.to_string())
    }

    /// Validate the callback state, exchange the code, and persist the
    /// resulting credential.
    pub async fn complete(
        &self,
        provider: IntegrationProvider,
        code: &str,
        state: &str,
    ) -> Result<IntegrationRecord, FlowError> {
        let claims = state_token::decode(&self.state_secret, state)?;
        if claims.provider != provider {
            return Err(FlowError::ProviderMismatch);
        }

        let config = self.registry.get(provider);
        let tokens = self.token_client.exchange(config, code).await?;

        let record = self
            .repo
            .upsert(NewIntegration {
                user_id: claims.user_id,
                provider,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                expires_at: tokens.expires_at,
            })
            .await?;

        info!(user_id = %claims.user_id, %provider, "integration connected");
        Ok(record)
    }

    /// A valid access token for `(user, provider)`, refreshing through the
    /// single-flight guard when the stored one is near expiry.
    pub async fn access_token(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<String, AccessTokenError> {
        let record = self
            .repo
            .find(user_id, provider)
            .await?
            .ok_or(AccessTokenError::NotConnected(provider))?;

        if !needs_refresh(&record) {
            return Ok(record.access_token);
        }

        let key = (user_id, provider);
        let guard = self
            .refresh_guards
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _held = guard.lock().await;
            self.refresh_under_guard(user_id, provider).await
        };

        // Drop the map entry once no caller waits on it; `guard` plus the
        // map each hold one reference, so a higher count means waiters.
        self.refresh_guards
            .remove_if(&key, |_, entry| Arc::strong_count(entry) <= 2);

        result
    }

    async fn refresh_under_guard(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<String, AccessTokenError> {
        // A concurrent caller may have refreshed while we waited.
        let record = self
            .repo
            .find(user_id, provider)
            .await?
            .ok_or(AccessTokenError::NotConnected(provider))?;
        if !needs_refresh(&record) {
            return Ok(record.access_token);
        }

        let Some(refresh_token) = record.refresh_token.as_deref() else {
            return Err(AccessTokenError::ReauthorizationRequired(provider));
        };

        let config = self.registry.get(provider);
        let tokens = match self.token_client.refresh(config, refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) => {
                // Stored record stays as-is; the user re-runs the flow.
                warn!(%user_id, %provider, ?err, "token refresh failed");
                return Err(AccessTokenError::ReauthorizationRequired(provider));
            }
        };

        let updated = self
            .repo
            .upsert(NewIntegration {
                user_id,
                provider,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                expires_at: tokens.expires_at,
            })
            .await?;

        Ok(updated.access_token)
    }

    pub async fn is_connected(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<bool, sqlx::Error> {
        Ok(self.repo.find(user_id, provider).await?.is_some())
    }

    pub async fn connected_providers(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<IntegrationProvider>, sqlx::Error> {
        let records = self.repo.list_for_user(user_id).await?;
        Ok(records.into_iter().map(|r| r.provider).collect())
    }

    pub async fn disconnect(
        &self,
        user_id: Uuid,
        provider: IntegrationProvider,
    ) -> Result<bool, sqlx::Error> {
        let removed = self.repo.delete(user_id, provider).await?;
        if removed {
            info!(%user_id, %provider, "integration disconnected");
        }
        Ok(removed)
    }
}

fn needs_refresh(record: &IntegrationRecord) -> bool {
    match record.expires_at {
        Some(expires_at) => expires_at <= OffsetDateTime::now_utc() + EXPIRY_LEEWAY,
        // No expiry reported (GitHub): the token lives until revoked.
        None => false,
    }
}
