use std::sync::Arc;

use crate::config::Config;
use crate::db::subscription_repository::SubscriptionRepository;
use crate::services::billing::sync::SubscriptionSynchronizer;
use crate::services::billing::BillingService;
use crate::services::oauth::integration_service::IntegrationService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub integrations: Arc<IntegrationService>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub billing: Arc<dyn BillingService>,
    pub synchronizer: Arc<SubscriptionSynchronizer>,
}
