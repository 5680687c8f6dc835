//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_ENQUEUE_TIMEOUT_MS, DEFAULT_HTTP_PORT, DEFAULT_LANG, DISPLAY_NAME_TIMEOUT_MS,
    OUTBOUND_QUEUE_CAPACITY, TRANSLATE_TIMEOUT_MS,
};

/// What to do with a recipient whose outbound queue stays full past the
/// enqueue deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the envelope and count it.
    Drop,
    /// Drop the envelope, count it, and close the slow connection.
    Disconnect,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(OverflowPolicy::Drop),
            "disconnect" => Ok(OverflowPolicy::Disconnect),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file backing the message store.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// Language assigned to connections admitted without one.
    /// Env: `DEFAULT_LANG`
    pub default_lang: String,

    /// Per-connection outbound queue bound.
    /// Env: `OUTBOUND_QUEUE_CAPACITY`
    pub queue_capacity: usize,

    /// Bounded wait for a full outbound queue.
    /// Env: `ENQUEUE_TIMEOUT_MS`
    pub enqueue_timeout: Duration,

    /// Env: `OVERFLOW_POLICY` (`drop` | `disconnect`)
    pub overflow_policy: OverflowPolicy,

    /// Env: `DISPLAY_NAME_TIMEOUT_MS`
    pub display_name_timeout: Duration,

    /// Env: `TRANSLATE_TIMEOUT_MS`
    pub translate_timeout: Duration,

    /// CORS origins. Empty allows any origin.
    /// Env: `ALLOWED_ORIGINS` (comma-separated)
    pub allowed_origins: Vec<String>,
}

/// The subset of configuration the hub runs on.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub default_lang: String,
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    pub display_name_timeout: Duration,
    pub translate_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        ServerConfig::default().hub()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./parley.db"),
            default_lang: DEFAULT_LANG.to_string(),
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            enqueue_timeout: Duration::from_millis(DEFAULT_ENQUEUE_TIMEOUT_MS),
            overflow_policy: OverflowPolicy::Drop,
            display_name_timeout: Duration::from_millis(DISPLAY_NAME_TIMEOUT_MS),
            translate_timeout: Duration::from_millis(TRANSLATE_TIMEOUT_MS),
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(lang) = var("DEFAULT_LANG") {
            let lang = lang.trim();
            if !lang.is_empty() {
                config.default_lang = lang.to_string();
            }
        }

        if let Some(val) = var("OUTBOUND_QUEUE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.queue_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_QUEUE_CAPACITY, using default"),
            }
        }

        if let Some(ms) = parse_millis(&var, "ENQUEUE_TIMEOUT_MS") {
            config.enqueue_timeout = ms;
        }

        if let Some(val) = var("OVERFLOW_POLICY") {
            match val.parse::<OverflowPolicy>() {
                Ok(policy) => config.overflow_policy = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid OVERFLOW_POLICY, using default"),
            }
        }

        if let Some(ms) = parse_millis(&var, "DISPLAY_NAME_TIMEOUT_MS") {
            config.display_name_timeout = ms;
        }

        if let Some(ms) = parse_millis(&var, "TRANSLATE_TIMEOUT_MS") {
            config.translate_timeout = ms;
        }

        if let Some(origins) = var("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn hub(&self) -> HubConfig {
        HubConfig {
            default_lang: self.default_lang.clone(),
            queue_capacity: self.queue_capacity,
            enqueue_timeout: self.enqueue_timeout,
            overflow_policy: self.overflow_policy,
            display_name_timeout: self.display_name_timeout,
            translate_timeout: self.translate_timeout,
        }
    }
}

fn parse_millis(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = var(key)?;
    match val.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(key, value = %val, "Invalid millisecond value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.overflow_policy, OverflowPolicy::Drop);
        assert_eq!(config.default_lang, "en");
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("OUTBOUND_QUEUE_CAPACITY", "8"),
            ("ENQUEUE_TIMEOUT_MS", "50"),
            ("OVERFLOW_POLICY", "Disconnect"),
            ("ALLOWED_ORIGINS", "http://a.test, ,http://b.test"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.enqueue_timeout, Duration::from_millis(50));
        assert_eq!(config.overflow_policy, OverflowPolicy::Disconnect);
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("OUTBOUND_QUEUE_CAPACITY", "0"),
            ("OVERFLOW_POLICY", "block"),
            ("TRANSLATE_TIMEOUT_MS", "soon"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.queue_capacity, defaults.queue_capacity);
        assert_eq!(config.overflow_policy, OverflowPolicy::Drop);
        assert_eq!(config.translate_timeout, defaults.translate_timeout);
    }
}
