use std::env;
use std::fmt::Debug;
use std::str::FromStr;

use tracing::warn;

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub resync_interval_secs: u64,
    pub flush_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is not set".to_string())?;

        Ok(Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            resync_interval_secs: parse_env("RESYNC_INTERVAL_SECS", 60),
            flush_interval_secs: parse_env("FLUSH_INTERVAL_SECS", 300),
        })
    }
}

fn parse_env<T: FromStr + Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}
