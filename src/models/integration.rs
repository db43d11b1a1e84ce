use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Providers a user can connect from the dashboard. The set is fixed at
/// compile time; adding a provider means adding a variant plus its entry in
/// the provider registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IntegrationProvider {
    Spotify,
    Github,
    Google,
}

impl IntegrationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationProvider::Spotify => "spotify",
            IntegrationProvider::Github => "github",
            IntegrationProvider::Google => "google",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "spotify" => Some(IntegrationProvider::Spotify),
            "github" => Some(IntegrationProvider::Github),
            "google" => Some(IntegrationProvider::Google),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntegrationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connected provider account per `(user_id, provider)`. No row means
/// "not connected". `refresh_token` and `expires_at` are optional because
/// some providers (GitHub) issue non-expiring tokens without a refresh
/// token.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IntegrationRecord {
    pub user_id: Uuid,
    pub provider: IntegrationProvider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
