//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_MAX_REFERENCE_DEPTH;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/twitter";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default directory holding the source documents.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default directory for row files and bad-line logs.
pub const DEFAULT_WORK_DIR: &str = "work";

/// Rows buffered per table before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of concurrent table loads within a tier.
pub const DEFAULT_LOAD_CONCURRENCY: usize = 4;

/// Pipeline configuration, built once and passed to each stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub data_dir: PathBuf,
    pub work_dir: PathBuf,
    /// Extraction workers (OS threads)
    pub workers: usize,
    /// Concurrent table loads within a tier
    pub load_concurrency: usize,
    pub batch_size: usize,
    pub max_reference_depth: usize,
    /// Turn off synchronous commit for load transactions
    pub relaxed_durability: bool,
    /// Files per extraction/load round; `None` processes everything in one round
    pub round_size: Option<usize>,
    /// Maximum number of input files to process
    pub limit: Option<usize>,
    pub keep_row_files: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|s| match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

impl PipelineConfig {
    /// Load configuration from environment and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = PipelineConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(defaults.database.max_connections),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(defaults.database.connect_timeout_secs),
            },
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            work_dir: std::env::var("TWEETLOAD_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            workers: env_parse("TWEETLOAD_WORKERS").unwrap_or(defaults.workers),
            load_concurrency: env_parse("TWEETLOAD_LOAD_CONCURRENCY")
                .unwrap_or(defaults.load_concurrency),
            batch_size: env_parse("TWEETLOAD_BATCH_SIZE").unwrap_or(defaults.batch_size),
            max_reference_depth: env_parse("TWEETLOAD_MAX_REFERENCE_DEPTH")
                .unwrap_or(defaults.max_reference_depth),
            relaxed_durability: env_flag("TWEETLOAD_RELAXED_DURABILITY")
                .unwrap_or(defaults.relaxed_durability),
            round_size: env_parse("TWEETLOAD_ROUND_SIZE"),
            limit: None,
            keep_row_files: false,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.load_concurrency == 0 {
            anyhow::bail!("Load concurrency must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.round_size == Some(0) {
            anyhow::bail!("Round size must be greater than 0");
        }

        if self.load_concurrency > self.database.max_connections as usize {
            tracing::warn!(
                load_concurrency = self.load_concurrency,
                max_connections = self.database.max_connections,
                "Load concurrency exceeds the connection pool size; loads will queue for connections"
            );
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            workers: default_workers(),
            load_concurrency: DEFAULT_LOAD_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
            relaxed_durability: true,
            round_size: None,
            limit: None,
            keep_row_files: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.max_reference_depth, 2);
        assert!(config.relaxed_durability);
        assert!(config.workers > 0);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = PipelineConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.round_size = Some(0);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.database.url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.database.connect_timeout(),
            Duration::from_secs(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS)
        );
    }
}
