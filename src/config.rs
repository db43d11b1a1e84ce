use std::env;

#[derive(Clone)]
pub struct OAuthProviderSettings {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
pub struct OAuthSettings {
    pub spotify: OAuthProviderSettings,
    pub github: OAuthProviderSettings,
    pub google: OAuthProviderSettings,
    /// Secret used to sign the OAuth state token carried across the
    /// provider redirect.
    pub state_secret: String,
}

#[derive(Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_standard: String,
    pub price_pro: String,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    /// Public base URL of this backend; OAuth redirect URIs are derived
    /// from it, so it must match what is registered with each provider.
    pub backend_url: String,
    pub oauth: OAuthSettings,
    pub stripe: StripeSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");
        let backend_url = env::var("BACKEND_URL").unwrap_or_else(|_| frontend_origin.clone());

        Config {
            database_url,
            frontend_origin,
            backend_url,
            oauth: OAuthSettings {
                spotify: provider_from_env("SPOTIFY"),
                github: provider_from_env("GITHUB"),
                google: provider_from_env("GOOGLE"),
                state_secret: env::var("OAUTH_STATE_SECRET")
                    .expect("OAUTH_STATE_SECRET must be set"),
            },
            stripe: StripeSettings {
                secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                    .expect("STRIPE_WEBHOOK_SECRET must be set"),
                price_standard: env::var("STRIPE_PRICE_STANDARD").unwrap_or_default(),
                price_pro: env::var("STRIPE_PRICE_PRO").unwrap_or_default(),
            },
        }
    }
}

fn provider_from_env(prefix: &str) -> OAuthProviderSettings {
    OAuthProviderSettings {
        client_id: env::var(format!("{prefix}_CLIENT_ID")).unwrap_or_default(),
        client_secret: env::var(format!("{prefix}_CLIENT_SECRET")).unwrap_or_default(),
    }
}

#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        frontend_origin: "https://app.example.com".into(),
        backend_url: "https://api.example.com".into(),
        oauth: OAuthSettings {
            spotify: OAuthProviderSettings {
                client_id: "spotify-client".into(),
                client_secret: "spotify-secret".into(),
            },
            github: OAuthProviderSettings {
                client_id: "github-client".into(),
                client_secret: "github-secret".into(),
            },
            google: OAuthProviderSettings {
                client_id: "google-client".into(),
                client_secret: "google-secret".into(),
            },
            state_secret: "0123456789abcdef0123456789abcdef".into(),
        },
        stripe: StripeSettings {
            secret_key: "sk_test_dummy".into(),
            webhook_secret: "whsec_test_secret".into(),
            price_standard: "price_standard_test".into(),
            price_pro: "price_pro_test".into(),
        },
    }
}
