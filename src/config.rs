//! Configuration management for Turnstile.
//!
//! Values are layered from built-in defaults, an optional YAML file and
//! `TURNSTILE__`-prefixed environment variables, then held immutable for the
//! life of the process.

use axum::http::HeaderName;
use redis::{ConnectionInfo, IntoConnectionInfo, RedisResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{check_duration, Policies};

/// Environment variable prefix, e.g. `TURNSTILE__LIMITS__IP__LIMIT_PER_WINDOW`.
pub const ENV_PREFIX: &str = "TURNSTILE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Address and credential limit policies
    #[serde(default)]
    pub limits: Policies,

    /// How requests are mapped to rate keys
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Counter store backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Identity resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Header carrying the API credential
    #[serde(default = "default_token_header")]
    pub token_header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
        }
    }
}

fn default_token_header() -> String {
    "API_KEY".to_string()
}

impl IdentityConfig {
    /// Parse the credential header name.
    pub fn header_name(&self) -> Result<HeaderName> {
        if self.token_header.trim().is_empty() {
            return Err(TurnstileError::Config("token_header must not be empty".to_string()));
        }
        HeaderName::from_bytes(self.token_header.as_bytes()).map_err(|e| {
            TurnstileError::Config(format!("invalid token_header {:?}: {}", self.token_header, e))
        })
    }
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single-process map
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Only consulted when `backend` is `redis`
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://` URL or bare `host:port`
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Password, overriding any in the URL
    #[serde(default)]
    pub password: Option<String>,

    /// Database index, overriding any in the URL
    #[serde(default)]
    pub db: Option<i64>,

    /// Upper bound on every round trip
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Namespace for all keys written by this service
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            password: None,
            db: None,
            operation_timeout: default_operation_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_key_prefix() -> String {
    "turnstile".to_string()
}

impl RedisConfig {
    /// Resolve the URL plus password and database overrides.
    pub fn connection_info(&self) -> RedisResult<ConnectionInfo> {
        let url = if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("redis://{}", self.url)
        };

        let mut info = url.as_str().into_connection_info()?;
        if let Some(password) = &self.password {
            info.redis.password = Some(password.clone());
        }
        if let Some(db) = self.db {
            info.redis.db = db;
        }
        Ok(info)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `turnstile=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    ///
    /// The result is not validated, so callers can apply their own overrides
    /// first and then call [`validate`](Self::validate) once.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Serialized defaults let a single override leave its siblings intact
        let defaults = config::Config::try_from(&TurnstileConfig::default())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service must not start with.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.identity.header_name()?;

        if self.storage.backend == BackendKind::Redis {
            let redis = &self.storage.redis;
            check_duration("redis operation_timeout", redis.operation_timeout)?;
            redis.connection_info().map_err(|e| {
                TurnstileError::Config(format!("invalid redis url {:?}: {}", redis.url, e))
            })?;
        }

        Ok(())
    }
}
