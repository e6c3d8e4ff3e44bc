//! Command line arguments and the validated benchmark configuration.

use clap::{Parser, ValueEnum};
use queue_types::PutItem;
use std::time::Duration;
use thiserror::Error;

/// Measure put and take throughput of a queue server.
///
/// Start the server first, then point this at its base URL.
#[derive(Debug, Parser)]
#[command(name = "queue-bench", version)]
pub struct Args {
    /// Queue server URL, e.g. http://localhost:8080
    pub url: String,

    /// Number of seconds to furiously /put data
    #[arg(long, default_value_t = 10)]
    pub seconds: u64,

    /// Number of workers to /put and /take with
    #[arg(long, default_value_t = 10)]
    pub parallelism: usize,

    /// Server-side poll timeout of each /take call
    #[arg(long, default_value_t = 100)]
    pub take_timeout_millis: u64,

    /// Item name sent with every /put
    #[arg(long, default_value = "foo")]
    pub item: String,

    /// The /put data blob is "asdfasdf" repeated this many times
    #[arg(long, default_value_t = 10)]
    pub data_repeat: usize,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Log filter, e.g. "info" or "queue_bench=debug"
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--seconds must be greater than zero")]
    ZeroDuration,

    #[error("--parallelism must be at least 1")]
    ZeroParallelism,

    #[error("url must start with http:// or https://, got {0:?}")]
    InvalidUrl(String),
}

/// Settings for one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub url: String,
    /// How long the put phase runs before its workers are terminated
    pub put_duration: Duration,
    /// Workers per phase
    pub parallelism: usize,
    pub take_timeout: Duration,
    pub payload: PutItem,
    pub format: OutputFormat,
}

impl BenchConfig {
    /// Defaults matching the command line defaults
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            put_duration: Duration::from_secs(10),
            parallelism: 10,
            take_timeout: Duration::from_millis(100),
            payload: PutItem::default(),
            format: OutputFormat::Text,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.put_duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        Ok(())
    }
}

impl TryFrom<Args> for BenchConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let config = BenchConfig {
            url: args.url,
            put_duration: Duration::from_secs(args.seconds),
            parallelism: args.parallelism,
            take_timeout: Duration::from_millis(args.take_timeout_millis),
            payload: PutItem::new(args.item, args.data_repeat),
            format: args.format,
        };
        config.validate()?;
        Ok(config)
    }
}
