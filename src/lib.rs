pub mod auth;
pub mod bookings;
pub mod chat;
pub mod config;
pub mod error;
pub mod issues;
pub mod models;
pub mod negotiation;
pub mod openapi;
pub mod policy;
pub mod rate_limit;
pub mod repo;
pub mod response;
pub mod routes;
pub mod security;
pub mod stats;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
