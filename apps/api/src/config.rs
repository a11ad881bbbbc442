use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub matching_api_url: String,
    pub matching_api_key: Option<String>,
    pub matching_timeout_secs: u64,
    /// Seconds between background dispatch runs. 0 disables the loop.
    pub dispatch_interval_secs: u64,
    pub dispatch_batch_size: i64,
    pub outbound_queue: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            jwt_secret: require_env("JWT_SECRET")?,
            matching_api_url: require_env("MATCHING_API_URL")?,
            matching_api_key: std::env::var("MATCHING_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            matching_timeout_secs: parse_env("MATCHING_TIMEOUT_SECS", 60)?,
            dispatch_interval_secs: parse_env("DISPATCH_INTERVAL_SECS", 60)?,
            dispatch_batch_size: parse_env("DISPATCH_BATCH_SIZE", 50)?,
            outbound_queue: std::env::var("OUTBOUND_QUEUE")
                .unwrap_or_else(|_| "outbound_emails".to_string()),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
