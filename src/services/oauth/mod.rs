pub mod integration_service;
pub mod registry;
pub mod state_token;
pub mod token_client;
