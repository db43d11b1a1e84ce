mod config;
mod db;
mod models;
mod responses;
mod routes;
mod services;
mod session;
mod state;
mod utils;

use std::{net::SocketAddr, sync::Arc};

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Config;
use db::postgres_integration_repository::PostgresIntegrationRepository;
use db::postgres_subscription_repository::PostgresSubscriptionRepository;
use db::postgres_webhook_event_log_repository::PostgresWebhookEventLogRepository;
use db::subscription_repository::SubscriptionRepository;
use db::webhook_event_log_repository::WebhookEventLogRepository;
use responses::JsonResponse;
use routes::billing::{create_checkout, create_portal, get_subscription, webhook};
use routes::integrations::{
    authorize_integration, disconnect_integration, integration_status, list_integrations,
    oauth_callback,
};
use services::billing::live::LiveBillingService;
use services::billing::sync::{PriceTierMap, SubscriptionSynchronizer};
use services::billing::BillingService;
use services::oauth::integration_service::IntegrationService;
use services::oauth::registry::ProviderRegistry;
use services::oauth::token_client::TokenExchangeClient;
use state::AppState;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install tracing subscriber");

    let config = Arc::new(Config::from_env());

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .expect("invalid rate limiter configuration"),
    );
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pool = establish_connection(&config.database_url).await;

    let integration_repo = Arc::new(PostgresIntegrationRepository::new(pool.clone()));
    let subscription_repo = Arc::new(PostgresSubscriptionRepository::new(pool.clone()))
        as Arc<dyn SubscriptionRepository>;
    let event_log = Arc::new(PostgresWebhookEventLogRepository::new(pool.clone()))
        as Arc<dyn WebhookEventLogRepository>;

    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let integrations = Arc::new(IntegrationService::new(
        registry,
        TokenExchangeClient::new(config.backend_url.clone()),
        integration_repo,
        config.oauth.state_secret.clone(),
    ));

    let billing =
        Arc::new(LiveBillingService::from_settings(&config.stripe)) as Arc<dyn BillingService>;
    let synchronizer = Arc::new(SubscriptionSynchronizer::new(
        billing.clone(),
        subscription_repo.clone(),
        event_log,
        PriceTierMap::from_settings(&config.stripe),
    ));

    let state = AppState {
        config: config.clone(),
        integrations,
        subscriptions: subscription_repo,
        billing,
        synchronizer,
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .expect("FRONTEND_ORIGIN is not a valid header value"),
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let integration_routes = Router::new()
        .route("/", get(list_integrations))
        .route("/{provider}/status", get(integration_status))
        .route("/{provider}/authorize", get(authorize_integration))
        .route("/{provider}/callback", get(oauth_callback))
        .route("/{provider}", delete(disconnect_integration))
        .layer(GovernorLayer {
            config: governor_conf.clone(),
        });

    let subscription_routes = Router::new()
        .route("/", get(get_subscription))
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
        .layer(GovernorLayer {
            config: governor_conf,
        })
        // The billing provider drives its own retry schedule; rate
        // limiting the webhook would only amplify redelivery.
        .route("/webhook", post(webhook));

    let app = Router::new()
        .nest("/api/integrations", integration_routes)
        .nest("/api/subscriptions", subscription_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}

async fn establish_connection(database_url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .expect("failed to connect to database")
}
