use std::time::Duration as StdDuration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::models::integration::IntegrationProvider;
use crate::services::oauth::registry::ProviderConfig;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Tokens returned by a provider's token endpoint. `expires_in` is converted
/// to an absolute timestamp here so callers never handle relative values.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Error, Debug)]
pub enum TokenExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} token endpoint rejected the request: {detail}")]
    Rejected {
        provider: IntegrationProvider,
        detail: String,
    },
    #[error("invalid response from {provider} token endpoint")]
    InvalidResponse { provider: IntegrationProvider },
}

#[derive(Clone)]
pub struct TokenExchangeClient {
    client: Client,
    /// Public base URL this backend is reachable at; the registered
    /// redirect URI for each provider is derived from it.
    redirect_base: String,
}

impl TokenExchangeClient {
    pub fn new(redirect_base: String) -> Self {
        // Built once at startup; a client without the timeout would let a
        // stalled token endpoint hang callers indefinitely.
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http client");
        Self {
            client,
            redirect_base,
        }
    }

    pub fn redirect_uri(&self, provider: IntegrationProvider) -> String {
        format!(
            "{}/api/integrations/{}/callback",
            self.redirect_base.trim_end_matches('/'),
            provider
        )
    }

    pub async fn exchange(
        &self,
        config: &ProviderConfig,
        code: &str,
    ) -> Result<ExchangedTokens, TokenExchangeError> {
        let redirect_uri = self.redirect_uri(config.provider);
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &redirect_uri),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ];
        self.request_tokens(config, &form).await
    }

    pub async fn refresh(
        &self,
        config: &ProviderConfig,
        refresh_token: &str,
    ) -> Result<ExchangedTokens, TokenExchangeError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ];
        self.request_tokens(config, &form).await
    }

    async fn request_tokens(
        &self,
        config: &ProviderConfig,
        form: &[(&str, &str)],
    ) -> Result<ExchangedTokens, TokenExchangeError> {
        let response = match self.post_form(config, form).await {
            Ok(response) => response,
            // One retry for transient transport failures only; a response
            // that arrived is never retried.
            Err(err) if err.is_timeout() || err.is_connect() => {
                warn!(provider = %config.provider, ?err, "token request failed, retrying once");
                self.post_form(config, form).await?
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|_| TokenExchangeError::InvalidResponse {
                provider: config.provider,
            })?;

        if !status.is_success() || body.error.is_some() {
            let detail = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| format!("status {status}"));
            return Err(TokenExchangeError::Rejected {
                provider: config.provider,
                detail,
            });
        }

        let access_token = body
            .access_token
            .ok_or(TokenExchangeError::InvalidResponse {
                provider: config.provider,
            })?;

        Ok(ExchangedTokens {
            access_token,
            refresh_token: body.refresh_token,
            expires_at: body
                .expires_in
                .map(|secs| OffsetDateTime::now_utc() + Duration::seconds(secs)),
        })
    }

    async fn post_form(
        &self,
        config: &ProviderConfig,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&config.token_endpoint)
            // GitHub answers with urlencoded unless asked for JSON.
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
    }
}
