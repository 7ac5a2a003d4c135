use dotenv::dotenv;
use std::env;

/// Process-wide configuration, loaded once at startup and injected into
/// handlers through the router state. Handlers never read the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub chapa_secret_key: String,
    pub chapa_base_url: String,
    pub default_from_email: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv().ok(); // Load .env file if present
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            port: env::var("PORT").unwrap_or_else(|_| "8000".to_string()).parse()?,
            jwt_secret: env::var("JWT_SECRET")?,
            chapa_secret_key: env::var("CHAPA_SECRET_KEY")?,
            chapa_base_url: env::var("CHAPA_BASE_URL")
                .unwrap_or_else(|_| "https://api.chapa.co/v1".to_string()),
            default_from_email: env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@travelapp.com".to_string()),
            smtp_server: env::var("SMTP_SERVER").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("SMTP_PORT").unwrap_or_else(|_| "587".to_string()).parse()?,
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
        })
    }
}
