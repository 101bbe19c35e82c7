//! Server configuration and command-line parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use logscope_core::RetentionConfig;
use logscope_core::index::DEFAULT_MAX_SIZE;
use logscope_core::retention::{DEFAULT_DELETE_COUNT, DEFAULT_MAX_AGE_MS, DEFAULT_MAX_TOTAL};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default request body limit in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// LogScope log collection and search server.
#[derive(Parser, Debug, Clone)]
#[command(name = "logscope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to.
    #[arg(long, env = "LOGSCOPE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Directory for log partitions and the starred file.
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// API key required on `/api` routes. Blank disables authentication.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum number of entries resident in the query index.
    #[arg(long, env = "LOGSCOPE_MAX_INDEX_SIZE", default_value_t = DEFAULT_MAX_SIZE)]
    pub max_index_size: usize,

    /// Entries older than this many milliseconds are deleted.
    #[arg(long, env = "LOGSCOPE_MAX_AGE_MS", default_value_t = DEFAULT_MAX_AGE_MS)]
    pub max_age_ms: u64,

    /// Capacity threshold across both partitions.
    #[arg(long, env = "LOGSCOPE_MAX_TOTAL", default_value_t = DEFAULT_MAX_TOTAL)]
    pub max_total: usize,

    /// Minimum number of entries deleted when over capacity.
    #[arg(long, env = "LOGSCOPE_DELETE_COUNT", default_value_t = DEFAULT_DELETE_COUNT)]
    pub delete_count: usize,

    /// Seconds between retention sweeps.
    #[arg(long, env = "LOGSCOPE_CLEANUP_INTERVAL_SECS", default_value_t = 60)]
    pub cleanup_interval_secs: u64,

    /// Collect requests allowed per client per window.
    #[arg(long, env = "LOGSCOPE_RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: u32,

    /// Rate limit window in seconds.
    #[arg(long, env = "LOGSCOPE_RATE_WINDOW_SECS", default_value_t = 60)]
    pub rate_window_secs: u64,

    /// Allowed CORS origin; repeat for several. None allows any origin.
    #[arg(long = "cors-origin", env = "LOGSCOPE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOGSCOPE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    /// Converts parsed arguments into a server configuration.
    #[must_use]
    pub fn into_config(self) -> ServerConfig {
        let retention = RetentionConfig::default()
            .with_max_age_ms(self.max_age_ms)
            .with_max_total(self.max_total)
            .with_delete_count(self.delete_count)
            .with_interval(Duration::from_secs(self.cleanup_interval_secs));

        let mut config = ServerConfig::new(SocketAddr::new(self.host, self.port))
            .with_log_dir(self.log_dir)
            .with_max_index_size(self.max_index_size)
            .with_retention(retention)
            .with_rate_limit(RateLimitConfig {
                max_requests: self.rate_limit,
                window: Duration::from_secs(self.rate_window_secs),
            });
        if let Some(key) = self.api_key {
            config = config.with_api_key(key);
        }
        for origin in self.cors_origins {
            config = config.with_cors_origin(origin);
        }
        config
    }
}

/// Sliding-window limit for the collect endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per client within `window`.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Configuration for the LogScope server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Directory for log partitions and the starred file.
    pub log_dir: PathBuf,
    /// API key for `/api` routes; `None` disables authentication.
    pub api_key: Option<String>,
    /// Query index capacity.
    pub max_index_size: usize,
    /// Retention limits and sweep interval.
    pub retention: RetentionConfig,
    /// Collect endpoint rate limit.
    pub rate_limit: RateLimitConfig,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            log_dir: PathBuf::from("logs"),
            api_key: None,
            max_index_size: DEFAULT_MAX_SIZE,
            retention: RetentionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors_origins: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Set the API key. Surrounding whitespace is ignored and a blank key
    /// disables authentication.
    #[must_use]
    pub fn with_api_key(mut self, key: impl AsRef<str>) -> Self {
        let key = key.as_ref().trim();
        self.api_key = (!key.is_empty()).then(|| key.to_string());
        self
    }

    /// Set the query index capacity.
    #[must_use]
    pub const fn with_max_index_size(mut self, max_index_size: usize) -> Self {
        self.max_index_size = max_index_size;
        self
    }

    /// Set the retention configuration.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Set the collect rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Set the request body limit.
    #[must_use]
    pub const fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}
