//! Configuration Loader
//!
//! Layered loading through the `config` crate: serde defaults, then an
//! optional TOML file, then `FIXUP_`-prefixed environment overrides
//! (`FIXUP_EXECUTION__MAX_WORKERS=8`).

use super::error::{ConfigResult, ConfigurationError};
use super::FixupConfig;
use crate::constants::system;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: FixupConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load and validate configuration. An explicit path wins over
    /// `FIXUP_CONFIG_PATH`; with neither, only defaults and environment
    /// overrides apply.
    pub fn load(path: Option<&Path>) -> ConfigResult<ConfigManager> {
        let manager = Self::load_unvalidated(path)?;
        manager.config.validate()?;
        Ok(manager)
    }

    /// Like [`ConfigManager::load`], but leaves validation to the caller,
    /// which must validate after applying its own overrides.
    pub fn load_unvalidated(path: Option<&Path>) -> ConfigResult<ConfigManager> {
        let source_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(system::CONFIG_PATH_ENV_VAR).map(PathBuf::from));

        let mut builder = Config::builder();
        if let Some(file) = &source_path {
            builder = builder.add_source(File::from(file.as_path()).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(system::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let source_name = source_path
            .as_ref()
            .map_or_else(|| "environment".to_string(), |p| p.display().to_string());
        let merged = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(&source_name, e))?;
        let config: FixupConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigurationError::Deserialize(e.to_string()))?;

        let environment = Self::detect_environment();
        debug!(
            environment = %environment,
            source = %source_name,
            mode = ?config.execution.mode,
            max_workers = config.execution.max_workers,
            "Configuration loaded"
        );

        Ok(ConfigManager {
            config,
            environment,
            source_path,
        })
    }

    /// Parse a TOML document directly, without environment overrides
    pub fn from_toml_str(content: &str) -> ConfigResult<ConfigManager> {
        let merged = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::load_error("inline", e))?;
        let config: FixupConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigurationError::Deserialize(e.to_string()))?;
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        })
    }

    pub fn config(&self) -> &FixupConfig {
        &self.config
    }

    /// Hand out the configuration for CLI overrides
    pub fn into_config(self) -> FixupConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Current environment name
    pub fn detect_environment() -> String {
        env::var(system::ENV_VAR).unwrap_or_else(|_| "development".to_string())
    }
}
