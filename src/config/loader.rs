//! Configuration Loader
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults ([`ServiceConfig::default`])
//! 2. An optional TOML file (explicit path, else `STATEMACHINE_CONFIG_PATH`)
//! 3. Environment variables, `STATEMACHINE__<SECTION>__<FIELD>`
//!
//! Command-line overrides are applied by the server binary on top of the
//! loaded value, followed by [`ServiceConfig::validate`].

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::ServiceConfig;

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Environment variable naming the TOML file
    pub const CONFIG_PATH_ENV: &'static str = "STATEMACHINE_CONFIG_PATH";
    pub const ENV_PREFIX: &'static str = "STATEMACHINE";

    pub fn new() -> Self {
        Self {
            path: None,
            env_prefix: Self::ENV_PREFIX.to_string(),
        }
    }

    /// Read this file instead of consulting `STATEMACHINE_CONFIG_PATH`
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    fn resolve_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            std::env::var(Self::CONFIG_PATH_ENV)
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
        })
    }

    /// Merge all sources without validating the result
    pub fn load(&self) -> ConfigResult<ServiceConfig> {
        let defaults = Config::try_from(&ServiceConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = self.resolve_path() {
            builder = builder.add_source(Self::file_source(&path)?);
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ServiceConfig = builder.build()?.try_deserialize()?;

        debug!(
            store_in_memory = config.store.is_in_memory(),
            queue_backend = ?config.queues.backend,
            events_queue = %config.queues.events_queue,
            bind_address = %config.grpc.bind_address,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Merge all sources and validate
    pub fn load_and_validate(&self) -> ConfigResult<ServiceConfig> {
        let config = self.load()?;
        config.validate()?;
        Ok(config)
    }

    fn file_source(path: &Path) -> ConfigResult<File<::config::FileSourceFile, FileFormat>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(File::from(path).format(FileFormat::Toml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = ConfigLoader::new()
            .with_env_prefix("STATEMACHINE_LOADER_UNIT_DEFAULTS")
            .load()
            .unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[queues]
events_queue = "fsm_events"
batch_size = 25

[store]
timeout_ms = 500
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_env_prefix("STATEMACHINE_LOADER_UNIT_FILE")
            .with_file(file.path())
            .load_and_validate()
            .unwrap();

        assert_eq!(config.queues.events_queue, "fsm_events");
        assert_eq!(config.queues.batch_size, 25);
        assert_eq!(config.store.timeout_ms, 500);
        assert_eq!(config.store.max_retries, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/statemachine.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }
}
