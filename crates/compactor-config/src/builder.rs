//! Configuration builder for layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use compactor_types::{BatchSize, SavingsThreshold, WorkerCount};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source, skipped when the file does not exist
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        debug!("Reading configuration from {}", path.display());
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix).separator(&self.env_separator),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        SavingsThreshold::new(config.run.min_savings_percent)
            .map_err(|e| ConfigError::invalid_value("run.min_savings_percent", e))?;

        if let Some(workers) = config.run.workers {
            WorkerCount::new(workers).map_err(|e| ConfigError::invalid_value("run.workers", e))?;
        }

        BatchSize::new(config.planner.batch_size)
            .map_err(|e| ConfigError::invalid_value("planner.batch_size", e))?;

        if config.planner.max_command_chars < 256 {
            return Err(ConfigError::validation(
                "Maximum command length must be at least 256 characters",
            ));
        }

        if config.classifier.lzx_min_size < config.classifier.min_file_size {
            return Err(ConfigError::validation(
                "LZX minimum size must not be below the minimum file size",
            ));
        }

        if config.execution.batch_soft_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "Batch soft timeout must be greater than 0",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compactor_types::{LzxPolicy, OperationMode};
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config.run.mode, OperationMode::Normal);
        assert_eq!(config.planner.batch_size, 100);
    }

    #[test]
    fn test_builder_yaml_file() {
        let temp_file = yaml_file(
            r#"
run:
  mode: Thorough
  lzx_policy: ForceOff
  workers: 4
planner:
  batch_size: 25
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build()
            .unwrap();

        assert_eq!(config.run.mode, OperationMode::Thorough);
        assert_eq!(config.run.lzx_policy, LzxPolicy::ForceOff);
        assert_eq!(config.run.workers, Some(4));
        assert_eq!(config.planner.batch_size, 25);
        // Untouched sections keep their defaults
        assert_eq!(config.classifier.min_file_size, 8192);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/no/such/compactor.yaml")
            .build()
            .unwrap();
        assert_eq!(config.run.min_savings_percent, 10);
    }

    #[rstest]
    #[case("run:\n  min_savings_percent: 95\n", "run.min_savings_percent")]
    #[case("run:\n  workers: 0\n", "run.workers")]
    #[case("planner:\n  batch_size: 0\n", "planner.batch_size")]
    #[case("planner:\n  max_command_chars: 10\n", "Maximum command length")]
    #[case("logging:\n  level: loud\n", "Log level")]
    fn test_builder_validation(#[case] content: &str, #[case] expected: &str) {
        let temp_file = yaml_file(content);

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build();

        let message = result.unwrap_err().to_string();
        assert!(message.contains(expected), "unexpected error: {}", message);
    }
}
