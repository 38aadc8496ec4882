//! Configuration management for Compactor
//!
//! Settings are resolved in layers: built-in defaults, then an optional
//! configuration file (YAML, TOML or JSON), then `COMPACTOR__`-prefixed
//! environment variables. Command-line flags are applied on top by the CLI.
//!
//! # Examples
//!
//! ```rust
//! use compactor_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("compactor.yaml")
//!     .add_env_prefix("COMPACTOR")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Minimum file size: {}", config.classifier.min_file_size);
//! ```
//!
//! Environment overrides use `__` between section and key, for example
//! `COMPACTOR__RUN__MODE=Thorough` or `COMPACTOR__PLANNER__BATCH_SIZE=50`.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use compactor_types::{
    BatchSize, LzxPolicy, OperationMode, SavingsThreshold, WorkerCap, WorkerCount,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for Compactor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Run-level choices normally set from the command line
    pub run: RunSettings,
    /// File classification tuning
    pub classifier: ClassifierSettings,
    /// Batch planning tuning
    pub planner: PlannerSettings,
    /// Execution tuning
    pub execution: ExecutionSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Operation mode
    pub mode: OperationMode,
    /// LZX policy
    pub lzx_policy: LzxPolicy,
    /// Explicit worker count, `None` derives it from the CPU
    pub workers: Option<usize>,
    /// Force a single worker for both pools
    pub single_worker: bool,
    /// Minimum estimated savings, in percent, for sampled files
    pub min_savings_percent: u8,
    /// Sample file content when the extension is inconclusive
    pub entropy_sampling: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: OperationMode::Normal,
            lzx_policy: LzxPolicy::Auto,
            workers: None,
            single_worker: false,
            min_savings_percent: SavingsThreshold::DEFAULT,
            entropy_sampling: true,
        }
    }
}

impl RunSettings {
    /// Worker cap implied by these settings
    ///
    /// `single_worker` wins over an explicit count. Counts outside the valid
    /// range are rejected during validation, so this falls back to `Auto` only
    /// for unvalidated input.
    pub fn worker_cap(&self) -> WorkerCap {
        if self.single_worker {
            return WorkerCap::SingleWorker;
        }
        match self.workers.map(WorkerCount::new) {
            Some(Ok(count)) => WorkerCap::Fixed(count),
            _ => WorkerCap::Auto,
        }
    }

    /// Savings threshold, clamped to the valid range
    pub fn savings_threshold(&self) -> SavingsThreshold {
        SavingsThreshold::clamped(self.min_savings_percent)
    }
}

/// File classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Files smaller than this are skipped (bytes)
    pub min_file_size: u64,
    /// Files at least this large may use LZX (bytes)
    pub lzx_min_size: u64,
    /// Extensions to skip in addition to the built-in poor-yield list
    #[serde(default)]
    pub extra_skip_extensions: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_file_size: 8 * 1024,
            lzx_min_size: 8 * 1024 * 1024,
            extra_skip_extensions: Vec::new(),
        }
    }
}

/// Batch planning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Maximum files per batch
    pub batch_size: usize,
    /// Maximum length of one backend command line
    pub max_command_chars: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            batch_size: BatchSize::DEFAULT,
            max_command_chars: 4000,
        }
    }
}

impl PlannerSettings {
    /// Batch size as a validated newtype
    pub fn batch_size(&self) -> BatchSize {
        BatchSize::new(self.batch_size).unwrap_or_default()
    }
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Batches running longer than this are reported, never interrupted
    pub batch_soft_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            batch_soft_timeout_secs: 600,
        }
    }
}

impl ExecutionSettings {
    /// Soft timeout as a duration
    pub fn batch_soft_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_soft_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log file path, logs go to stderr only when unset
    pub log_file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            log_file: None,
            json_format: false,
            colored_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.run.mode, OperationMode::Normal);
        assert_eq!(config.run.lzx_policy, LzxPolicy::Auto);
        assert_eq!(config.run.min_savings_percent, 10);
        assert!(config.run.entropy_sampling);
        assert_eq!(config.classifier.min_file_size, 8192);
        assert_eq!(config.classifier.lzx_min_size, 8 * 1024 * 1024);
        assert_eq!(config.planner.batch_size, 100);
        assert_eq!(config.planner.max_command_chars, 4000);
        assert_eq!(
            config.execution.batch_soft_timeout(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_worker_cap() {
        let mut run = RunSettings::default();
        assert_eq!(run.worker_cap(), WorkerCap::Auto);

        run.workers = Some(3);
        assert_eq!(
            run.worker_cap(),
            WorkerCap::Fixed(WorkerCount::new(3).unwrap())
        );

        run.single_worker = true;
        assert_eq!(run.worker_cap(), WorkerCap::SingleWorker);
    }

    #[test]
    fn test_savings_threshold_clamped() {
        let run = RunSettings {
            min_savings_percent: 200,
            ..RunSettings::default()
        };
        assert_eq!(run.savings_threshold().get(), SavingsThreshold::MAX);
    }
}
