use crate::config::Config;
use crate::models::integration::IntegrationProvider;

const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-currently-playing",
    "user-read-playback-state",
    "user-top-read",
];
const GITHUB_SCOPES: &[&str] = &["read:user", "repo"];
const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Per-provider OAuth endpoints and credentials. Built once at startup and
/// shared immutably; every component that needs provider metadata reads it
/// from here.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: IntegrationProvider,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: &'static [&'static str],
    /// Extra query parameters some providers require on the authorization
    /// URL (Google needs these to issue a refresh token at all).
    pub extra_authorize_params: &'static [(&'static str, &'static str)],
}

impl ProviderConfig {
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

pub struct ProviderRegistry {
    spotify: ProviderConfig,
    github: ProviderConfig,
    google: ProviderConfig,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            spotify: ProviderConfig {
                provider: IntegrationProvider::Spotify,
                authorization_endpoint: SPOTIFY_AUTHORIZE_URL.into(),
                token_endpoint: SPOTIFY_TOKEN_URL.into(),
                client_id: config.oauth.spotify.client_id.clone(),
                client_secret: config.oauth.spotify.client_secret.clone(),
                scopes: SPOTIFY_SCOPES,
                extra_authorize_params: &[],
            },
            github: ProviderConfig {
                provider: IntegrationProvider::Github,
                authorization_endpoint: GITHUB_AUTHORIZE_URL.into(),
                token_endpoint: GITHUB_TOKEN_URL.into(),
                client_id: config.oauth.github.client_id.clone(),
                client_secret: config.oauth.github.client_secret.clone(),
                scopes: GITHUB_SCOPES,
                extra_authorize_params: &[],
            },
            google: ProviderConfig {
                provider: IntegrationProvider::Google,
                authorization_endpoint: GOOGLE_AUTHORIZE_URL.into(),
                token_endpoint: GOOGLE_TOKEN_URL.into(),
                client_id: config.oauth.google.client_id.clone(),
                client_secret: config.oauth.google.client_secret.clone(),
                scopes: GOOGLE_SCOPES,
                extra_authorize_params: &[("access_type", "offline"), ("prompt", "consent")],
            },
        }
    }

    pub fn get(&self, provider: IntegrationProvider) -> &ProviderConfig {
        match provider {
            IntegrationProvider::Spotify => &self.spotify,
            IntegrationProvider::Github => &self.github,
            IntegrationProvider::Google => &self.google,
        }
    }

    /// Registry with every token endpoint pointed at a local mock server.
    #[cfg(test)]
    pub fn with_token_endpoint(config: &Config, token_endpoint: &str) -> Self {
        let mut registry = Self::from_config(config);
        registry.spotify.token_endpoint = token_endpoint.to_string();
        registry.github.token_endpoint = token_endpoint.to_string();
        registry.google.token_endpoint = token_endpoint.to_string();
        registry
    }
}
