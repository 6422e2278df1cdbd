use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tokio_postgres::types::{FromSql, FromSqlOwned, Type};
use tokio_postgres::{Column, Row, SimpleQueryRow};

/// Categorized error types for SQL statement failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors (e.g., transaction aborted)
    Transaction,
    /// Connection/communication errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// A store-side failure, keeping what PostgreSQL reported about it.
#[derive(Debug, Clone)]
pub struct StructuredError {
    pub category: ErrorCategory,
    /// PostgreSQL severity (ERROR, FATAL, etc.)
    pub severity: String,
    /// SQLSTATE error code (e.g., "42601" for syntax_error)
    pub code: String,
    /// Primary error message, as the server worded it
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based byte offset into the statement
    pub position: Option<u32>,
    pub table: Option<String>,
    pub constraint: Option<String>,
    /// Computed line number (1-based) from position, if available
    pub line: Option<usize>,
    /// Computed column number (1-based) from position, if available
    pub col: Option<usize>,
}

impl StructuredError {
    /// Create a StructuredError from a tokio_postgres error, using the statement
    /// text to compute line/column from the byte position.
    pub fn from_pg_error(err: &tokio_postgres::Error, sql: &str) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code().to_string();
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let (line, col) = match position {
                Some(pos) => byte_offset_to_line_col(sql, pos as usize),
                None => (None, None),
            };

            StructuredError {
                category: categorize_sqlstate(&code),
                severity: db_err.severity().to_string(),
                code,
                message: db_err.message().to_string(),
                detail: db_err.detail().map(str::to_string),
                hint: db_err.hint().map(str::to_string),
                position,
                table: db_err.table().map(str::to_string),
                constraint: db_err.constraint().map(str::to_string),
                line,
                col,
            }
        } else {
            // Non-database error (connection, protocol, etc.)
            let category = if err.source().is_some() {
                ErrorCategory::Connection
            } else {
                ErrorCategory::Unknown
            };
            let mut structured = StructuredError::from_string(err.to_string());
            structured.category = category;
            structured.detail = err.source().map(|e| e.to_string());
            structured
        }
    }

    /// Create a simple error from a plain string (for non-database errors).
    pub fn from_string(msg: impl Into<String>) -> Self {
        StructuredError {
            category: ErrorCategory::Unknown,
            severity: "ERROR".to_string(),
            code: String::new(),
            message: msg.into(),
            detail: None,
            hint: None,
            position: None,
            table: None,
            constraint: None,
            line: None,
            col: None,
        }
    }

    /// One-line form, used for the audit log `details` column.
    pub fn display_message(&self) -> String {
        if self.code.is_empty() {
            self.message.clone()
        } else {
            format!("{} (SQLSTATE {})", self.message, self.code)
        }
    }

    /// Format as a rich multi-line string for the terminal.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];

        if let (Some(line), Some(col)) = (self.line, self.col) {
            lines.push(format!("  at line {}, column {}", line, col));
        }
        if !self.code.is_empty() {
            lines.push(format!("  SQLSTATE: {}", self.code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        if let Some(table) = &self.table {
            lines.push(format!("  Table: {}", table));
        }
        if let Some(constraint) = &self.constraint {
            lines.push(format!("  Constraint: {}", constraint));
        }

        lines.join("\n")
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_message())
    }
}

impl StdError for StructuredError {}

/// Convert a 1-based byte offset in a statement to (line, column), both 1-based.
fn byte_offset_to_line_col(sql: &str, byte_pos: usize) -> (Option<usize>, Option<usize>) {
    if byte_pos == 0 || sql.is_empty() {
        return (Some(1), Some(1));
    }
    let target = (byte_pos - 1).min(sql.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in sql.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (Some(line), Some(col))
}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        // 42601 = syntax_error; the rest of class 42 is missing objects or privileges
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// Rows and columns returned by a read statement, columns in cursor order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub execution_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int16(i) => i.to_string(),
            CellValue::Int32(i) => i.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float32(f) => f.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bytes(b) => format!("[{} bytes]", b.len()),
            CellValue::Date(d) => d.to_string(),
            CellValue::Time(t) => t.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_string(),
            CellValue::Json(j) => j.to_string(),
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }
}

impl ResultSet {
    /// Build a result set from already-materialized cells.
    pub fn new(column_names: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        let columns = column_names
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                type_name: "text".to_string(),
            })
            .collect();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Materialize rows using the prepared statement's column list, so the
/// column order is known even when no rows come back.
pub fn parse_rows(columns: &[Column], rows: &[Row], execution_time: Duration) -> ResultSet {
    let column_info: Vec<ColumnInfo> = columns
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_().name().to_string(),
        })
        .collect();

    let result_rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_value(row, i, col.type_()))
                .collect()
        })
        .collect();

    ResultSet {
        columns: column_info,
        rows: result_rows,
        execution_time,
    }
}

/// Materialize rows fetched over the simple query protocol, where every value
/// arrives in the server's text form. Columns come from the prepared statement.
pub fn parse_text_rows(
    columns: &[Column],
    rows: &[SimpleQueryRow],
    execution_time: Duration,
) -> ResultSet {
    let column_info: Vec<ColumnInfo> = columns
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_().name().to_string(),
        })
        .collect();

    let result_rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, col)| match row.try_get(i) {
                    Ok(Some(text)) => cell_from_text(col.type_(), text),
                    _ => CellValue::Null,
                })
                .collect()
        })
        .collect();

    ResultSet {
        columns: column_info,
        rows: result_rows,
        execution_time,
    }
}

/// Whether every value of `pg_type` decodes through `extract_value`.
/// NUMERIC, UUID, INTERVAL, INET, arrays and the like do not.
pub fn decodes_natively(pg_type: &Type) -> bool {
    match *pg_type {
        Type::BOOL
        | Type::INT2
        | Type::INT4
        | Type::INT8
        | Type::FLOAT4
        | Type::FLOAT8
        | Type::BYTEA
        | Type::DATE
        | Type::TIME
        | Type::TIMESTAMP
        | Type::TIMESTAMPTZ
        | Type::JSON
        | Type::JSONB => true,
        _ => <String as FromSql<'_>>::accepts(pg_type),
    }
}

/// Cell for a value in text form. Numbers and booleans keep their type;
/// everything else stays as the server printed it.
fn cell_from_text(pg_type: &Type, text: &str) -> CellValue {
    let typed = match *pg_type {
        Type::BOOL => match text {
            "t" => Some(CellValue::Bool(true)),
            "f" => Some(CellValue::Bool(false)),
            _ => None,
        },
        Type::INT2 => text.parse().ok().map(CellValue::Int16),
        Type::INT4 => text.parse().ok().map(CellValue::Int32),
        Type::INT8 => text.parse().ok().map(CellValue::Int64),
        Type::FLOAT4 => text.parse().ok().map(CellValue::Float32),
        Type::FLOAT8 => text.parse().ok().map(CellValue::Float64),
        _ => None,
    };
    typed.unwrap_or_else(|| CellValue::Text(text.to_string()))
}

fn get<T: FromSqlOwned>(row: &Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    let value = match *pg_type {
        Type::BOOL => get(row, idx).map(CellValue::Bool),
        Type::INT2 => get(row, idx).map(CellValue::Int16),
        Type::INT4 => get(row, idx).map(CellValue::Int32),
        Type::INT8 => get(row, idx).map(CellValue::Int64),
        Type::FLOAT4 => get(row, idx).map(CellValue::Float32),
        Type::FLOAT8 => get(row, idx).map(CellValue::Float64),
        Type::BYTEA => get(row, idx).map(CellValue::Bytes),
        Type::DATE => get(row, idx).map(CellValue::Date),
        Type::TIME => get(row, idx).map(CellValue::Time),
        Type::TIMESTAMP => get(row, idx).map(CellValue::DateTime),
        Type::TIMESTAMPTZ => get(row, idx).map(CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx).map(CellValue::Json),
        // TEXT, VARCHAR, NAME and anything else that decodes as a string
        _ => get(row, idx).map(CellValue::Text),
    };
    value.unwrap_or(CellValue::Null)
}
