//! Introspect, translate, classify, execute, audit: once per request.

use std::sync::Arc;

use crate::audit::{AuditLogger, AuditStatus, LogEntry};
use crate::classify::{ClassifiedStatement, StatementClassifier};
use crate::db::{Connector, Credentials};
use crate::error::{AuditError, ExecutionError, TranslationError};
use crate::execute::{execute, ExecutionOutcome};
use crate::introspect::schema_hint;
use crate::translate::Translator;

/// Everything the caller needs to show for one request that produced SQL.
///
/// `outcome` and `audit` are independent: an audit failure never replaces
/// the execution result, and both are always present.
#[derive(Debug)]
pub struct PipelineReport {
    pub schema_hint: String,
    pub statement: ClassifiedStatement,
    pub outcome: Result<ExecutionOutcome, ExecutionError>,
    pub audit: Result<(), AuditError>,
}

impl PipelineReport {
    pub fn status(&self) -> AuditStatus {
        match self.outcome {
            Ok(_) => AuditStatus::Success,
            Err(_) => AuditStatus::Failure,
        }
    }

    /// One-line status for display.
    pub fn status_message(&self) -> String {
        match &self.outcome {
            Ok(ExecutionOutcome::Rows(rows)) => format!("Rows returned: {}", rows.row_count()),
            Ok(ExecutionOutcome::Affected(n)) => {
                format!("Query executed successfully. Rows affected: {}", n)
            }
            Err(e) => format!("Database Execution Error: {}", e),
        }
    }
}

pub struct Pipeline {
    connector: Arc<dyn Connector>,
    translator: Translator,
    classifier: Box<dyn StatementClassifier>,
    audit: AuditLogger,
}

impl Pipeline {
    pub fn new(
        connector: Arc<dyn Connector>,
        translator: Translator,
        classifier: Box<dyn StatementClassifier>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            connector,
            translator,
            classifier,
            audit,
        }
    }

    /// Run one request end to end.
    ///
    /// Returns `Err` only when no SQL could be produced; nothing is executed
    /// or audited in that case. Once a statement exists, exactly one audit
    /// entry is attempted and the report carries both results.
    pub async fn run(
        &self,
        creds: &Credentials,
        request: &str,
    ) -> Result<PipelineReport, TranslationError> {
        let hint = schema_hint(self.connector.as_ref(), creds).await;

        let sql = self.translator.translate(request, &hint).await?;
        let statement = ClassifiedStatement {
            action: self.classifier.classify(&sql),
            sql,
        };
        tracing::debug!(action = %statement.action, sql = %statement.sql, "classified");

        let outcome = execute(self.connector.as_ref(), creds, &statement).await;
        if let Err(e) = &outcome {
            tracing::info!(error = %e, "statement failed");
        }

        let entry = LogEntry::for_attempt(&creds.app_user, request, &statement, &outcome);
        let audit = self.audit.append(creds, &entry).await;
        if let Err(e) = &audit {
            tracing::warn!(error = %e, "failed to write audit entry");
        }

        Ok(PipelineReport {
            schema_hint: hint,
            statement,
            outcome,
            audit,
        })
    }

    pub async fn schema_hint(&self, creds: &Credentials) -> String {
        schema_hint(self.connector.as_ref(), creds).await
    }

    /// The most recent audit entries, newest first.
    pub async fn recent_logs(&self, creds: &Credentials) -> Result<Vec<LogEntry>, AuditError> {
        self.audit.recent(creds, self.audit.recent_limit()).await
    }

    pub async fn ensure_audit_table(&self, creds: &Credentials) -> Result<(), AuditError> {
        self.audit.ensure_table(creds).await
    }

    pub async fn ping(&self) -> Result<String, TranslationError> {
        self.translator.ping().await
    }
}
