pub mod integration;
pub mod subscription;
