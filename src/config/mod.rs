//! Configuration module for the ledger backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::CascadeMode;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Webhook endpoint for the notification relay; `None` disables delivery
    pub webhook_url: Option<String>,
    /// Per-request timeout for webhook deliveries
    pub relay_timeout: Duration,
    /// How course renames and deletes reach the students collection
    pub cascade_mode: CascadeMode,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("LEDGER_DB_PATH")
            .unwrap_or_else(|_| "./data/ledger.sqlite".to_string())
            .into();

        let bind_addr = env::var("LEDGER_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid LEDGER_BIND_ADDR format");

        let log_level = env::var("LEDGER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let webhook_url = env::var("LEDGER_WEBHOOK_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let relay_timeout = env::var("LEDGER_RELAY_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let cascade_mode = env::var("LEDGER_CASCADE_MODE")
            .ok()
            .map(|mode| mode.parse().expect("Invalid LEDGER_CASCADE_MODE value"))
            .unwrap_or_default();

        Self {
            db_path,
            bind_addr,
            log_level,
            webhook_url,
            relay_timeout,
            cascade_mode,
        }
    }
}
