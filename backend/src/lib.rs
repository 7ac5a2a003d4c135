pub mod auth;
pub mod bookings;
pub mod chapa;
pub mod config;
pub mod db;
pub mod error;
pub mod listings;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod reviews;
pub mod schema;

use crate::chapa::ChapaClient;
use crate::config::AppConfig;
use crate::notifications::Notifier;

/// Shared handler state: configuration, the gateway client, and the
/// notification enqueue handle. Built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chapa: ChapaClient,
    pub notifier: Notifier,
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
