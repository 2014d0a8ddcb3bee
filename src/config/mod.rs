//! Configuration module for the Royal Academy backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.
//! Malformed values never abort startup; they fall back to the default and are
//! reported back to the caller so they can be logged once tracing is up.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

/// Timer settings for presence and dashboard refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// How often a joined viewer re-announces itself
    pub heartbeat_interval: Duration,
    /// Age after which a presence entry no longer counts as active
    pub presence_ttl: Duration,
    /// How often the teacher console polls the active viewer count
    pub viewer_poll_interval: Duration,
    /// Fallback refresh interval for dashboards between change events
    pub dashboard_poll_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            presence_ttl: Duration::from_secs(10),
            viewer_poll_interval: Duration::from_secs(3),
            dashboard_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to the local fallback cache; `None` keeps the cache in memory only
    pub cache_path: Option<PathBuf>,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub sync: SyncSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Returns the configuration together with a warning for every variable
    /// that was present but could not be parsed.
    pub fn from_env() -> (Self, Vec<String>) {
        dotenvy::dotenv().ok();

        let mut warnings = Vec::new();
        let defaults = SyncSettings::default();

        let api_psk = env::var("ROYAL_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("ROYAL_DB_PATH")
            .unwrap_or_else(|_| "./data/royal-academy.sqlite".to_string())
            .into();

        let cache_path = match env::var("ROYAL_CACHE_PATH") {
            Ok(path) if path.is_empty() || path == ":memory:" => None,
            Ok(path) => Some(path.into()),
            Err(_) => Some("./data/local-cache.json".into()),
        };

        let bind_addr = parse_var("ROYAL_BIND_ADDR", &mut warnings)
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND_ADDR));

        let log_level = env::var("ROYAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let sync = SyncSettings {
            heartbeat_interval: secs_var("ROYAL_HEARTBEAT_SECS", &mut warnings)
                .unwrap_or(defaults.heartbeat_interval),
            presence_ttl: secs_var("ROYAL_PRESENCE_TTL_SECS", &mut warnings)
                .unwrap_or(defaults.presence_ttl),
            viewer_poll_interval: secs_var("ROYAL_VIEWER_POLL_SECS", &mut warnings)
                .unwrap_or(defaults.viewer_poll_interval),
            dashboard_poll_interval: secs_var("ROYAL_DASHBOARD_POLL_SECS", &mut warnings)
                .unwrap_or(defaults.dashboard_poll_interval),
        };

        let config = Self {
            api_psk,
            db_path,
            cache_path,
            bind_addr,
            log_level,
            sync,
        };

        (config, warnings)
    }
}

fn parse_var<T: FromStr>(name: &str, warnings: &mut Vec<String>) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warnings.push(format!("Ignoring invalid {}={:?}, using default", name, raw));
            None
        }
    }
}

fn secs_var(name: &str, warnings: &mut Vec<String>) -> Option<Duration> {
    match parse_var::<u64>(name, warnings) {
        Some(0) => {
            warnings.push(format!("Ignoring {}=0, interval must be positive", name));
            None
        }
        other => other.map(Duration::from_secs),
    }
}
