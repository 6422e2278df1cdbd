use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio_postgres::{Client, SimpleQueryMessage, SimpleQueryRow};

use super::{
    create_client, decodes_natively, get_columns, get_tables, parse_rows, parse_text_rows,
    Credentials, ResultSet, StructuredError,
};
use crate::audit::{AuditStatus, LogEntry};
use crate::classify::ActionType;
use crate::error::ConnectivityError;

/// Opens sessions against the target store. Each call yields a new,
/// unshared connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, creds: &Credentials) -> Result<Box<dyn Session>, ConnectivityError>;
}

/// One open connection. Dropping the session closes it.
#[async_trait]
pub trait Session: Send {
    async fn list_tables(&mut self) -> Result<Vec<String>, StructuredError>;

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, StructuredError>;

    /// Run a read statement in autocommit mode and materialize every row.
    /// Only SQL NULL becomes `CellValue::Null`.
    async fn query(&mut self, sql: &str) -> Result<ResultSet, StructuredError>;

    /// Run one statement in autocommit mode and return the affected-row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, StructuredError>;

    async fn create_log_table(&mut self, table: &str) -> Result<(), StructuredError>;

    async fn append_log(&mut self, table: &str, entry: &LogEntry) -> Result<(), StructuredError>;

    async fn recent_logs(&mut self, table: &str, limit: i64) -> Result<Vec<LogEntry>, StructuredError>;
}

/// Connects to PostgreSQL with `tokio-postgres`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, creds: &Credentials) -> Result<Box<dyn Session>, ConnectivityError> {
        let client = create_client(creds).await?;
        Ok(Box::new(PgSession { client }))
    }
}

pub struct PgSession {
    client: Client,
}

#[async_trait]
impl Session for PgSession {
    async fn list_tables(&mut self) -> Result<Vec<String>, StructuredError> {
        get_tables(&self.client)
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, ""))
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, StructuredError> {
        get_columns(&self.client, table)
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, ""))
    }

    async fn query(&mut self, sql: &str) -> Result<ResultSet, StructuredError> {
        let start = Instant::now();
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, sql))?;

        if statement.columns().iter().all(|c| decodes_natively(c.type_())) {
            let rows = self
                .client
                .query(&statement, &[])
                .await
                .map_err(|e| StructuredError::from_pg_error(&e, sql))?;
            return Ok(parse_rows(statement.columns(), &rows, start.elapsed()));
        }

        // Some column has no native decoding: fetch every value as text.
        tracing::debug!("reading result in text form");
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, sql))?;
        let rows: Vec<SimpleQueryRow> = messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();
        Ok(parse_text_rows(statement.columns(), &rows, start.elapsed()))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StructuredError> {
        // Autocommit: the statement commits on success and runs outside any
        // transaction block, which VACUUM and CREATE DATABASE require.
        self.client
            .execute(sql, &[])
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, sql))
    }

    async fn create_log_table(&mut self, table: &str) -> Result<(), StructuredError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                user_name TEXT NOT NULL,
                user_input TEXT NOT NULL,
                generated_sql TEXT NOT NULL,
                action_type VARCHAR(10) NOT NULL,
                status VARCHAR(10) NOT NULL,
                details TEXT,
                log_time TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        );
        self.client
            .batch_execute(&ddl)
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, &ddl))
    }

    async fn append_log(&mut self, table: &str, entry: &LogEntry) -> Result<(), StructuredError> {
        // The cast lets an existing TIMESTAMP column accept the value too.
        let sql = format!(
            "INSERT INTO {table} \
             (user_name, user_input, generated_sql, action_type, status, details, log_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::timestamptz)"
        );
        let action = entry.action_type.to_string();
        let status = entry.status.to_string();
        self.client
            .execute(
                &sql,
                &[
                    &entry.user_name,
                    &entry.user_input,
                    &entry.generated_sql,
                    &action,
                    &status,
                    &entry.details,
                    &entry.log_time,
                ],
            )
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, &sql))?;
        Ok(())
    }

    async fn recent_logs(&mut self, table: &str, limit: i64) -> Result<Vec<LogEntry>, StructuredError> {
        // Casts let ENUM, VARCHAR and TIMESTAMP columns of an existing table read back.
        let sql = format!(
            "SELECT user_name::text AS user_name, user_input::text AS user_input, \
                    generated_sql::text AS generated_sql, action_type::text AS action_type, \
                    status::text AS status, details::text AS details, \
                    log_time::timestamptz AS log_time \
             FROM {table} ORDER BY log_time DESC LIMIT $1"
        );
        let rows = self
            .client
            .query(&sql, &[&limit])
            .await
            .map_err(|e| StructuredError::from_pg_error(&e, &sql))?;

        rows.iter()
            .map(|row| {
                let text = |name: &str| -> Result<String, StructuredError> {
                    row.try_get::<_, Option<String>>(name)
                        .map(Option::unwrap_or_default)
                        .map_err(|e| StructuredError::from_pg_error(&e, &sql))
                };
                let action_type: ActionType = text("action_type")?
                    .parse()
                    .map_err(StructuredError::from_string)?;
                let status: AuditStatus = text("status")?
                    .parse()
                    .map_err(StructuredError::from_string)?;
                let log_time = row
                    .try_get::<_, Option<DateTime<Utc>>>("log_time")
                    .map_err(|e| StructuredError::from_pg_error(&e, &sql))?
                    .unwrap_or_default();
                Ok(LogEntry {
                    user_name: text("user_name")?,
                    user_input: text("user_input")?,
                    generated_sql: text("generated_sql")?,
                    action_type,
                    status,
                    details: text("details")?,
                    log_time,
                })
            })
            .collect()
    }
}
