//! Append-only record of every statement the pipeline ran.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::classify::{ActionType, ClassifiedStatement};
use crate::config::AuditConfig;
use crate::db::{Connector, Credentials};
use crate::error::{AuditError, ExecutionError};
use crate::execute::ExecutionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failure,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "SUCCESS"),
            AuditStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILURE" => Ok(AuditStatus::Failure),
            other => Err(format!("unknown audit status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub user_name: String,
    pub user_input: String,
    pub generated_sql: String,
    pub action_type: ActionType,
    pub status: AuditStatus,
    pub details: String,
    pub log_time: DateTime<Utc>,
}

impl LogEntry {
    /// Entry describing one execution attempt, stamped now.
    pub fn for_attempt(
        user_name: &str,
        user_input: &str,
        statement: &ClassifiedStatement,
        outcome: &Result<ExecutionOutcome, ExecutionError>,
    ) -> Self {
        let (status, details) = match outcome {
            Ok(outcome) => (AuditStatus::Success, outcome.details()),
            Err(err) => (AuditStatus::Failure, err.details()),
        };
        Self {
            user_name: user_name.to_string(),
            user_input: user_input.to_string(),
            generated_sql: statement.sql.clone(),
            action_type: statement.action,
            status,
            details,
            log_time: Utc::now(),
        }
    }
}

/// Writes entries to the audit table of the target database, one fresh
/// connection per call.
pub struct AuditLogger {
    connector: Arc<dyn Connector>,
    table: String,
    recent_limit: i64,
}

impl AuditLogger {
    pub fn new(connector: Arc<dyn Connector>, config: &AuditConfig) -> Self {
        Self {
            connector,
            table: config.table.clone(),
            recent_limit: config.recent_limit,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn recent_limit(&self) -> i64 {
        self.recent_limit
    }

    pub async fn append(&self, creds: &Credentials, entry: &LogEntry) -> Result<(), AuditError> {
        let mut session = self.connector.connect(creds).await?;
        session
            .append_log(&self.table, entry)
            .await
            .map_err(AuditError::Write)?;
        tracing::debug!(status = %entry.status, action = %entry.action_type, "audit entry written");
        Ok(())
    }

    /// Latest entries first, at most `limit`.
    pub async fn recent(&self, creds: &Credentials, limit: i64) -> Result<Vec<LogEntry>, AuditError> {
        let mut session = self.connector.connect(creds).await?;
        session
            .recent_logs(&self.table, limit)
            .await
            .map_err(AuditError::Read)
    }

    /// Create the audit table when it does not exist yet.
    pub async fn ensure_table(&self, creds: &Credentials) -> Result<(), AuditError> {
        let mut session = self.connector.connect(creds).await?;
        session
            .create_log_table(&self.table)
            .await
            .map_err(AuditError::Write)
    }
}
