//! Alert Server Configuration Settings
//!
//! Configuration types for the alert server, loaded from environment variables.

use std::time::Duration;

/// Which upstream feeds the price monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSourceKind {
    /// Yahoo Finance chart API.
    #[default]
    Yahoo,
    /// In-process random walk, for demos and offline runs.
    Simulated,
}

impl PriceSourceKind {
    /// Parse a source kind, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownPriceSource` for anything else.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "simulated" => Ok(Self::Simulated),
            _ => Err(ConfigError::UnknownPriceSource(s.to_string())),
        }
    }

    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Simulated => "simulated",
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            health_port: 8082,
        }
    }
}

/// Monitor loop and delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Tick period.
    pub interval: Duration,
    /// Per-fetch timeout; always below `interval`.
    pub fetch_timeout: Duration,
    /// Evaluate stale and synthetic samples too.
    pub notify_on_fallback: bool,
    /// Per-connection outbound queue depth.
    pub outbound_capacity: usize,
    /// Subscription registry shard count.
    pub registry_shards: usize,
    /// Upstream price fetches allowed in flight at once.
    pub fetch_concurrency: usize,
    /// Conditions a single connection may hold.
    pub max_conditions_per_connection: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            fetch_timeout: Duration::from_millis(4000),
            notify_on_fallback: false,
            outbound_capacity: 64,
            registry_shards: 16,
            fetch_concurrency: 8,
            max_conditions_per_connection: 100,
        }
    }
}

/// External collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Price feed used by the monitor.
    pub price_source: PriceSourceKind,
    /// Quote API base URL.
    pub price_source_url: String,
    /// News page base URL.
    pub news_source_url: String,
    /// Analysis model server base URL.
    pub ollama_url: String,
    /// Analysis model name.
    pub ollama_model: String,
    /// HTTP timeout for the dashboard collaborators.
    pub timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            price_source: PriceSourceKind::Yahoo,
            price_source_url: "https://query1.finance.yahoo.com".to_string(),
            news_source_url: "https://finance.yahoo.com".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Complete alert server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertServerConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Monitor loop settings.
    pub monitor: MonitorSettings,
    /// External collaborator settings.
    pub upstream: UpstreamSettings,
}

impl AlertServerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a constrained value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a constrained value is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let server_defaults = ServerSettings::default();
        let monitor_defaults = MonitorSettings::default();
        let upstream_defaults = UpstreamSettings::default();

        let server = ServerSettings {
            port: env.parse("ALERT_SERVER_PORT", server_defaults.port),
            health_port: env.parse("ALERT_HEALTH_PORT", server_defaults.health_port),
        };

        let monitor = MonitorSettings {
            interval: env.millis("ALERT_MONITOR_INTERVAL_MS", monitor_defaults.interval),
            fetch_timeout: env.millis("ALERT_FETCH_TIMEOUT_MS", monitor_defaults.fetch_timeout),
            notify_on_fallback: env.flag(
                "ALERT_NOTIFY_ON_FALLBACK",
                monitor_defaults.notify_on_fallback,
            ),
            outbound_capacity: env.parse(
                "ALERT_OUTBOUND_CAPACITY",
                monitor_defaults.outbound_capacity,
            ),
            registry_shards: env.parse("ALERT_REGISTRY_SHARDS", monitor_defaults.registry_shards),
            fetch_concurrency: env.parse(
                "ALERT_FETCH_CONCURRENCY",
                monitor_defaults.fetch_concurrency,
            ),
            max_conditions_per_connection: env.parse(
                "ALERT_MAX_CONDITIONS",
                monitor_defaults.max_conditions_per_connection,
            ),
        };

        let price_source = env
            .get("PRICE_SOURCE")
            .map_or(Ok(upstream_defaults.price_source), |s| {
                PriceSourceKind::parse(&s)
            })?;

        let upstream = UpstreamSettings {
            price_source,
            price_source_url: env.string("PRICE_SOURCE_URL", upstream_defaults.price_source_url),
            news_source_url: env.string("NEWS_SOURCE_URL", upstream_defaults.news_source_url),
            ollama_url: env.string("OLLAMA_URL", upstream_defaults.ollama_url),
            ollama_model: env.string("OLLAMA_MODEL", upstream_defaults.ollama_model),
            timeout: env.millis("UPSTREAM_TIMEOUT_MS", upstream_defaults.timeout),
        };

        let config = Self {
            server,
            monitor,
            upstream,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitor = &self.monitor;
        if monitor.interval.is_zero() {
            return Err(ConfigError::ZeroValue("ALERT_MONITOR_INTERVAL_MS"));
        }
        if monitor.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("ALERT_FETCH_TIMEOUT_MS"));
        }
        if monitor.fetch_timeout >= monitor.interval {
            return Err(ConfigError::TimeoutNotBelowInterval {
                timeout: monitor.fetch_timeout,
                interval: monitor.interval,
            });
        }
        if monitor.outbound_capacity == 0 {
            return Err(ConfigError::ZeroValue("ALERT_OUTBOUND_CAPACITY"));
        }
        if monitor.registry_shards == 0 {
            return Err(ConfigError::ZeroValue("ALERT_REGISTRY_SHARDS"));
        }
        if monitor.fetch_concurrency == 0 {
            return Err(ConfigError::ZeroValue("ALERT_FETCH_CONCURRENCY"));
        }
        if monitor.max_conditions_per_connection == 0 {
            return Err(ConfigError::ZeroValue("ALERT_MAX_CONDITIONS"));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A value that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    /// Fetches could outlive the tick that started them.
    #[error("fetch timeout {timeout:?} must be below the monitor interval {interval:?}")]
    TimeoutNotBelowInterval {
        /// Configured fetch timeout.
        timeout: Duration,
        /// Configured tick period.
        interval: Duration,
    },
    /// `PRICE_SOURCE` names no known source.
    #[error("unknown price source: {0}")]
    UnknownPriceSource(String),
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| {
            matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes")
        })
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }
}
