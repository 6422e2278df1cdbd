//! Error types at each pipeline boundary.
//!
//! Every stage returns its own error so callers decide per stage whether a
//! failure is absorbed (introspection), ends the request (translation), or is
//! reported and audited (execution). Audit failures get their own type so they
//! can never stand in for the outcome they were recording.

use std::path::PathBuf;
use thiserror::Error;

use crate::db::StructuredError;
use crate::llm::LlmError;

/// The store could not be reached, or refused to describe itself.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("connection timed out after {0}s")]
    Timeout(u64),
    #[error("failed to connect to PostgreSQL: {0}")]
    Connect(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("schema query failed: {0}")]
    Metadata(StructuredError),
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("text-generation endpoint: {0}")]
    Endpoint(#[from] LlmError),
    #[error("text-generation response contained no choices")]
    NoChoices,
    #[error("model returned no SQL")]
    EmptySql,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error("{0}")]
    Statement(StructuredError),
}

impl ExecutionError {
    /// Text recorded in the audit log `details` column.
    pub fn details(&self) -> String {
        self.to_string()
    }

    /// Multi-line rendering for the terminal.
    pub fn display_full(&self) -> String {
        match self {
            ExecutionError::Statement(err) => err.display_full(),
            other => format!("Connection Error: {other}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Connectivity(#[from] ConnectivityError),
    #[error("audit log write failed: {0}")]
    Write(StructuredError),
    #[error("audit log read failed: {0}")]
    Read(StructuredError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("audit table name {0:?} is not a plain SQL identifier")]
    InvalidAuditTable(String),
}
