//! # Fixup Configuration
//!
//! One explicit configuration value per run, threaded through every
//! component call. Nothing here is read from process-wide state after
//! [`ConfigManager`] has produced it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use schema_fixup::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(None)?;
//! let workers = manager.config().execution.max_workers;
//! # let _ = workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{system, task_dirs};
use crate::models::ObjectType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixupConfig {
    pub execution: ExecutionConfig,
    pub client: ClientConfig,
    pub classification: ClassificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One pass; the first terminal failure stops further dispatch
    #[default]
    Single,
    /// Bounded rounds over retryable failures, no cancellation
    Iterative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    /// Dependency layers with within-layer topological order
    #[default]
    Smart,
    /// Alphabetical, one task at a time
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub max_rounds: u32,
    pub ordering: OrderingMode,
    pub max_workers: usize,
    pub task_timeout_secs: u64,
    pub idempotent: bool,
    pub archive_done: bool,
    pub done_dir: String,
    pub diagnostic_max_len: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Single,
            max_rounds: system::DEFAULT_MAX_ROUNDS,
            ordering: OrderingMode::Smart,
            max_workers: system::DEFAULT_MAX_WORKERS,
            task_timeout_secs: system::DEFAULT_TASK_TIMEOUT_SECS,
            idempotent: false,
            archive_done: true,
            done_dir: task_dirs::DONE.to_string(),
            diagnostic_max_len: system::DEFAULT_DIAGNOSTIC_MAX_LEN,
        }
    }
}

impl ExecutionConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn is_iterative(&self) -> bool {
        self.mode == ExecutionMode::Iterative
    }

    /// Rounds actually run: single mode always runs exactly one
    pub fn effective_rounds(&self) -> u32 {
        if self.is_iterative() {
            self.max_rounds
        } else {
            1
        }
    }
}

/// External SQL client invocation. Scripts are written to the client's
/// stdin; the combined stderr/stdout is the diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Query whose output is non-empty when the object exists. `{schema}`,
    /// `{name}` and `{type}` are substituted.
    pub existence_query: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: "sqlplus".to_string(),
            args: vec!["-S".to_string(), "-L".to_string()],
            existence_query: "SELECT 1 FROM ALL_OBJECTS WHERE OWNER = '{schema}' \
                              AND OBJECT_NAME = '{name}' AND OBJECT_TYPE = '{type}';"
                .to_string(),
        }
    }
}

impl ClientConfig {
    pub fn render_existence_query(&self, schema: &str, name: &str, object_type: ObjectType) -> String {
        self.existence_query
            .replace("{schema}", schema)
            .replace("{name}", name)
            .replace("{type}", &object_type.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Types never tracked; they do not appear in classification results
    pub excluded_types: Vec<ObjectType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; falls back to the environment default when unset
    pub level: Option<String>,
    pub format: LogFormat,
}

impl FixupConfig {
    /// Reject values that would stall or skip the run
    pub fn validate(&self) -> ConfigResult<()> {
        let exec = &self.execution;
        if exec.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_workers",
                "0",
                "at least one worker is required",
            ));
        }
        if exec.max_rounds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_rounds",
                "0",
                "at least one round is required",
            ));
        }
        if exec.task_timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.task_timeout_secs",
                "0",
                "timeout must be positive",
            ));
        }
        if exec.done_dir.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "execution.done_dir",
                "",
                "archive directory name must not be empty",
            ));
        }
        if self.client.program.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "client.program",
                "",
                "a client program is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FixupConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.max_rounds, 3);
        assert_eq!(config.execution.effective_rounds(), 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = FixupConfig::default();
        config.execution.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { field, .. }) if field == "execution.max_workers"
        ));
    }

    #[test]
    fn test_existence_query_rendering() {
        let client = ClientConfig {
            existence_query: "{schema}/{name}/{type}".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(
            client.render_existence_query("APP", "V", ObjectType::MaterializedView),
            "APP/V/MATERIALIZED VIEW"
        );
    }
}
