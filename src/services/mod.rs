pub mod billing;
pub mod oauth;
