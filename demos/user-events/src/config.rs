//! Configuration management for the user-events application.
//!
//! Values come from environment variables. [`EnvFiles::load`] first loads `.env.local`
//! and then `.env` with `dotenvy`; neither overrides a variable that is already set, so
//! the real environment always wins. Loading happens before logging is configured, so
//! the outcome is kept and [reported](EnvFiles::report) once a subscriber is installed.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing required environment variable {0}")]
    Missing(String),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// AWS connection settings
    pub aws: AwsConfig,
    /// Topic and queues
    pub events: EventsConfig,
    /// Worker settings
    pub worker: WorkerConfig,
    /// Logging and deployment settings
    pub app: AppConfig,
}

/// AWS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region (`AWS_REGION`, default `us-east-1`)
    pub region: String,
    /// Endpoint override (`AWS_ENDPOINT`)
    pub endpoint: Option<String>,
    /// Use static LocalStack credentials (`AWS_USE_LOCALSTACK`, default `false`)
    pub use_localstack: bool,
}

/// Topic and queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Topic user events are published to (`EVENTS_TOPIC_ARN`)
    pub topic_arn: Option<String>,
    /// Queue of `user.created` events (`EVENTS_QUEUE_URL_USER_CREATED`)
    pub user_created_queue_url: String,
    /// Queue of `user.updated` events (`EVENTS_QUEUE_URL_USER_UPDATED`)
    pub user_updated_queue_url: String,
    /// Queue of `user.deleted` events (`EVENTS_QUEUE_URL_USER_DELETED`)
    pub user_deleted_queue_url: String,
}

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Messages per receive (`WORKER_MAX_BATCH_SIZE`, default 1)
    pub max_batch_size: u32,
    /// Grace period for consumers to stop (`WORKER_SHUTDOWN_TIMEOUT_SECS`, default 30)
    pub shutdown_timeout_secs: u64,
    /// Prometheus listen address (`METRICS_ADDR`); no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl WorkerConfig {
    /// Grace period for consumers to stop.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging and deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment name (`ENVIRONMENT`, default `development`)
    pub environment: String,
    /// Log level (`LOG_LEVEL`, default `info`)
    pub log_level: String,
    /// Log format, `json` or `text` (`LOG_FORMAT`, default `text`)
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl AppConfig {
    /// Whether logs should be JSON lines.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Reads variables through a lookup function.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `key`, treating an empty value as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|value| {
                value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                    key: key.to_string(),
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" => Ok(true),
            "0" | "f" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

/// Environment files, in load order.
pub const ENV_FILES: [&str; 2] = [".env.local", ".env"];

/// An environment file that exists but could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFileError {
    /// File name as searched for
    pub file: String,
    /// Why loading failed
    pub error: String,
}

/// What loading the [`ENV_FILES`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFiles {
    loaded: Vec<PathBuf>,
    failed: Vec<EnvFileError>,
}

impl EnvFiles {
    /// Load every file of [`ENV_FILES`] that exists into the process environment.
    ///
    /// Missing files are skipped. Nothing is logged here; call [`report`](Self::report)
    /// after tracing is initialised.
    #[must_use]
    pub fn load() -> Self {
        let mut files = Self::default();
        for file in ENV_FILES {
            match dotenvy::from_filename(file) {
                Ok(path) => files.loaded.push(path),
                Err(e) if e.not_found() => {}
                Err(e) => files.failed.push(EnvFileError {
                    file: file.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        files
    }

    /// Files that were loaded.
    #[must_use]
    pub fn loaded(&self) -> &[PathBuf] {
        &self.loaded
    }

    /// Files that exist but failed to load.
    #[must_use]
    pub fn failed(&self) -> &[EnvFileError] {
        &self.failed
    }

    /// Log the outcome: loaded files at `debug`, failures at `warn`.
    pub fn report(&self) {
        for path in &self.loaded {
            tracing::debug!(path = %path.display(), "Loaded environment file");
        }
        for failure in &self.failed {
            tracing::warn!(
                file = %failure.file,
                error = %failure.error,
                "Failed to load environment file"
            );
        }
    }
}

impl Config {
    /// Read the process environment. Load [`EnvFiles`] first to pick up `.env` files.
    ///
    /// # Errors
    ///
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from a variable lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] if a queue URL is not set
    /// - [`ConfigError::Invalid`] if a boolean, number or address does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup };

        Ok(Self {
            aws: AwsConfig {
                region: vars.or("AWS_REGION", "us-east-1"),
                endpoint: vars.optional("AWS_ENDPOINT"),
                use_localstack: vars.flag("AWS_USE_LOCALSTACK", false)?,
            },
            events: EventsConfig {
                topic_arn: vars.optional("EVENTS_TOPIC_ARN"),
                user_created_queue_url: vars.required("EVENTS_QUEUE_URL_USER_CREATED")?,
                user_updated_queue_url: vars.required("EVENTS_QUEUE_URL_USER_UPDATED")?,
                user_deleted_queue_url: vars.required("EVENTS_QUEUE_URL_USER_DELETED")?,
            },
            worker: WorkerConfig {
                max_batch_size: vars.parsed("WORKER_MAX_BATCH_SIZE")?.unwrap_or(1),
                shutdown_timeout_secs: vars.parsed("WORKER_SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(30),
                metrics_addr: vars.parsed("METRICS_ADDR")?,
            },
            app: AppConfig {
                environment: vars.or("ENVIRONMENT", "development"),
                log_level: vars.or("LOG_LEVEL", "info"),
                log_format: vars.or("LOG_FORMAT", "text"),
            },
        })
    }
}
