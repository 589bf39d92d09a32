//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::topics;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Topic names the service publishes to and consumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub trade_created: String,
    pub items_lock_completed: String,
    pub items_trade_completed: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            trade_created: topics::TRADE_OFFER_CREATED.to_string(),
            items_lock_completed: topics::ITEMS_LOCK_COMPLETED.to_string(),
            items_trade_completed: topics::ITEMS_TRADE_COMPLETED.to_string(),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `DISPATCH_INTERVAL_SECS`: outbox poll interval (default: `5`)
/// - `CONSUMER_MAX_RETRIES`: deliveries before dead-lettering (default: `3`)
/// - `EXTERNAL_CALL_TIMEOUT_MS`: deadline per repository/gateway call (default: `5000`)
/// - `TOPIC_TRADE_CREATED`, `TOPIC_ITEMS_LOCK_COMPLETED`, `TOPIC_ITEMS_TRADE_COMPLETED`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub dispatch_interval: Duration,
    pub consumer_max_retries: u32,
    pub call_timeout: Duration,
    pub topics: TopicConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parsed_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed_with(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed_with(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            dispatch_interval: parsed_with(&lookup, "DISPATCH_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dispatch_interval),
            consumer_max_retries: parsed_with(&lookup, "CONSUMER_MAX_RETRIES")
                .unwrap_or(defaults.consumer_max_retries),
            call_timeout: parsed_with(&lookup, "EXTERNAL_CALL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            topics: TopicConfig {
                trade_created: non_empty("TOPIC_TRADE_CREATED")
                    .unwrap_or(defaults.topics.trade_created),
                items_lock_completed: non_empty("TOPIC_ITEMS_LOCK_COMPLETED")
                    .unwrap_or(defaults.topics.items_lock_completed),
                items_trade_completed: non_empty("TOPIC_ITEMS_TRADE_COMPLETED")
                    .unwrap_or(defaults.topics.items_trade_completed),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            dispatch_interval: Duration::from_secs(5),
            consumer_max_retries: event_bus::DEFAULT_MAX_RETRIES,
            call_timeout: saga::DEFAULT_CALL_TIMEOUT,
            topics: TopicConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.dispatch_interval, Duration::from_secs(5));
        assert_eq!(config.consumer_max_retries, 3);
        assert_eq!(config.call_timeout, Duration::from_millis(5000));
        assert_eq!(config.topics.trade_created, "trade-offer-created");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/trades"),
            ("DISPATCH_INTERVAL_SECS", "1"),
            ("CONSUMER_MAX_RETRIES", "7"),
            ("EXTERNAL_CALL_TIMEOUT_MS", "250"),
            ("TOPIC_ITEMS_LOCK_COMPLETED", "locks"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/trades")
        );
        assert_eq!(config.dispatch_interval, Duration::from_secs(1));
        assert_eq!(config.consumer_max_retries, 7);
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.topics.items_lock_completed, "locks");
        assert_eq!(config.topics.items_trade_completed, "items-trade-completed");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "xml"),
            ("DATABASE_URL", "  "),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
    }
}
