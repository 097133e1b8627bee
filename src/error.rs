//! Error types for the fixup engine.

use crate::config::ConfigurationError;
use crate::dependency::graph::GraphError;
use crate::orchestration::sql_client::SqlClientError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixupError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("State transition error: {0}")]
    StateMachine(#[from] StateMachineError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("SQL client error: {0}")]
    SqlClient(#[from] SqlClientError),
    #[error("Task discovery error: {0}")]
    TaskDiscovery(String),
    #[error("Catalog error: {0}")]
    Catalog(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FixupError {
    fn from(error: serde_json::Error) -> Self {
        FixupError::Catalog(format!("JSON serialization error: {error}"))
    }
}

pub type FixupResult<T> = std::result::Result<T, FixupError>;
