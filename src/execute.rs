use crate::classify::{ActionType, ClassifiedStatement};
use crate::db::{Connector, Credentials, ResultSet};
use crate::error::ExecutionError;

/// What a statement produced: rows for a read, a count for a write.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Rows(ResultSet),
    Affected(u64),
}

impl ExecutionOutcome {
    /// Text recorded in the audit log `details` column.
    pub fn details(&self) -> String {
        match self {
            ExecutionOutcome::Rows(rows) => format!("Rows returned: {}", rows.row_count()),
            ExecutionOutcome::Affected(n) => format!("Rows affected: {}", n),
        }
    }
}

/// Run a classified statement on a fresh connection. The connection is
/// closed when the session drops, on success and failure alike.
pub async fn execute(
    connector: &dyn Connector,
    creds: &Credentials,
    statement: &ClassifiedStatement,
) -> Result<ExecutionOutcome, ExecutionError> {
    let mut session = connector.connect(creds).await?;

    let outcome = match statement.action {
        ActionType::Read => session
            .query(&statement.sql)
            .await
            .map(ExecutionOutcome::Rows),
        ActionType::Write => session
            .execute(&statement.sql)
            .await
            .map(ExecutionOutcome::Affected),
    };

    outcome.map_err(ExecutionError::Statement)
}
