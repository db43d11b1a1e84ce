pub mod billing;
pub mod integrations;
