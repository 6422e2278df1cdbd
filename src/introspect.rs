use crate::db::{Connector, Credentials};
use crate::error::ConnectivityError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub table: String,
    pub columns: Vec<String>,
}

/// Table and column names as they were when fetched. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableColumns>,
}

impl SchemaSnapshot {
    /// Compact grounding text: `customers(id, name), orders(id, total)`.
    pub fn hint(&self) -> String {
        self.tables
            .iter()
            .map(|t| format!("{}({})", t.table, t.columns.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Read every table of the current schema and its columns over one connection.
pub async fn fetch_schema(
    connector: &dyn Connector,
    creds: &Credentials,
) -> Result<SchemaSnapshot, ConnectivityError> {
    let mut session = connector.connect(creds).await?;

    let tables = session
        .list_tables()
        .await
        .map_err(ConnectivityError::Metadata)?;

    let mut snapshot = SchemaSnapshot::default();
    for table in tables {
        let columns = session
            .list_columns(&table)
            .await
            .map_err(ConnectivityError::Metadata)?;
        snapshot.tables.push(TableColumns { table, columns });
    }

    tracing::debug!(tables = snapshot.tables.len(), "schema fetched");
    Ok(snapshot)
}

/// Schema hint for the translator. Any failure degrades to an empty hint.
pub async fn schema_hint(connector: &dyn Connector, creds: &Credentials) -> String {
    match fetch_schema(connector, creds).await {
        Ok(snapshot) => snapshot.hint(),
        Err(e) => {
            tracing::warn!(error = %e, "schema introspection failed, continuing without a hint");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{creds, FakeConnector};

    #[test]
    fn test_hint_format() {
        let snapshot = SchemaSnapshot {
            tables: vec![
                TableColumns {
                    table: "customers".into(),
                    columns: vec!["id".into(), "name".into(), "email".into()],
                },
                TableColumns {
                    table: "orders".into(),
                    columns: vec!["id".into(), "total".into()],
                },
            ],
        };
        assert_eq!(snapshot.hint(), "customers(id, name, email), orders(id, total)");
    }

    #[test]
    fn test_empty_snapshot_has_empty_hint() {
        assert_eq!(SchemaSnapshot::default().hint(), "");
        assert!(SchemaSnapshot::default().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_keeps_store_order() {
        let connector = FakeConnector::new()
            .with_table("users", &["id", "name"])
            .with_table("accounts", &["user_id", "balance"]);

        let snapshot = fetch_schema(&connector, &creds()).await.unwrap();
        assert_eq!(snapshot.tables[0].table, "users");
        assert_eq!(snapshot.tables[1].columns, vec!["user_id", "balance"]);
        assert_eq!(snapshot.hint(), "users(id, name), accounts(user_id, balance)");
        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_degrades_to_empty_hint() {
        let connector = FakeConnector::new()
            .with_table("users", &["id"])
            .failing_connect();

        assert!(matches!(
            fetch_schema(&connector, &creds()).await,
            Err(ConnectivityError::Connect(_))
        ));
        assert_eq!(schema_hint(&connector, &creds()).await, "");
    }

    #[tokio::test]
    async fn test_metadata_failure_degrades_to_empty_hint() {
        let connector = FakeConnector::new().failing_metadata();
        assert!(matches!(
            fetch_schema(&connector, &creds()).await,
            Err(ConnectivityError::Metadata(_))
        ));
        assert_eq!(schema_hint(&connector, &creds()).await, "");
    }
}
