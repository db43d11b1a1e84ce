pub mod integration_repository;
pub mod postgres_integration_repository;
pub mod postgres_subscription_repository;
pub mod postgres_webhook_event_log_repository;
pub mod subscription_repository;
pub mod webhook_event_log_repository;

#[cfg(test)]
pub mod mock_db;
