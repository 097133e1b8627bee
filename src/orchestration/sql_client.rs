//! # SQL Client Seam
//!
//! The orchestrator never talks to a database directly. Every statement goes
//! through a [`SqlClient`]; the production implementation pipes the script
//! into an external client program and reads back its output.

use crate::config::ClientConfig;
use crate::models::ObjectKey;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SqlClientError {
    #[error("Failed to start client program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Client I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Client timed out after {0:?}")]
    Timeout(Duration),
}

pub type SqlClientResult<T> = Result<T, SqlClientError>;

/// What one script execution produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Combined stdout and stderr; the diagnostic on failure
    pub output: String,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            duration: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run one script against the target
    async fn execute(&self, script: &str, timeout: Duration) -> SqlClientResult<ExecutionOutcome>;

    /// Whether `key` exists on the target
    async fn object_exists(&self, key: &ObjectKey, timeout: Duration) -> SqlClientResult<bool>;
}

/// Client that spawns an external program per call
#[derive(Debug, Clone)]
pub struct ProcessSqlClient {
    config: ClientConfig,
}

impl ProcessSqlClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    async fn run(&self, script: &str, timeout: Duration) -> SqlClientResult<ExecutionOutcome> {
        let started = Instant::now();
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SqlClientError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        // Fed from its own task so a client that stops reading cannot hold
        // the call past its timeout
        let writer = child.stdin.take().map(|mut stdin| {
            let input = format!("{script}\nexit\n");
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Client stopped reading its input");
                }
            })
        });

        // Dropping the future on timeout drops the child, which kills it
        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
        if let Some(writer) = writer {
            writer.abort();
        }
        let output = match waited {
            Ok(result) => result?,
            Err(_) => {
                warn!(program = %self.config.program, ?timeout, "Client timed out");
                return Err(SqlClientError::Timeout(timeout));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(&stderr);
        }
        let success = output.status.success() && !output_reports_error(&text);
        debug!(
            program = %self.config.program,
            success,
            exit_code = output.status.code(),
            "Client call finished"
        );

        Ok(ExecutionOutcome {
            success,
            output: text,
            duration: started.elapsed(),
        })
    }
}

#[async_trait]
impl SqlClient for ProcessSqlClient {
    async fn execute(&self, script: &str, timeout: Duration) -> SqlClientResult<ExecutionOutcome> {
        self.run(script, timeout).await
    }

    async fn object_exists(&self, key: &ObjectKey, timeout: Duration) -> SqlClientResult<bool> {
        let query = self
            .config
            .render_existence_query(&key.schema, &key.name, key.object_type);
        let outcome = self.run(&query, timeout).await?;
        Ok(outcome.success && existence_output_is_positive(&outcome.output))
    }
}

/// Some clients exit 0 after a failed statement; look for their error
/// markers in the output as well
pub fn output_reports_error(output: &str) -> bool {
    output.lines().map(str::trim_start).any(|line| {
        line.starts_with("ORA-")
            || line.starts_with("SP2-")
            || line.starts_with("PLS-")
            || line.starts_with("ERROR ")
            || (line.starts_with("Warning: ") && line.contains("compilation errors"))
    })
}

/// The existence query selects the literal `1` for a present object
fn existence_output_is_positive(output: &str) -> bool {
    output.lines().any(|line| line.trim() == "1")
}
