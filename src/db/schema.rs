use tokio_postgres::Client;

/// Tables and views visible in the connection's current schema, by name.
pub async fn get_tables(client: &Client) -> Result<Vec<String>, tokio_postgres::Error> {
    let rows = client
        .query(
            r#"
            SELECT c.relname as name
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema()
              AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
            ORDER BY c.relname
            "#,
            &[],
        )
        .await?;

    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// Column names of one table, in ordinal position.
pub async fn get_columns(client: &Client, table: &str) -> Result<Vec<String>, tokio_postgres::Error> {
    let rows = client
        .query(
            r#"
            SELECT c.column_name::text as name
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema() AND c.table_name = $1
            ORDER BY c.ordinal_position
            "#,
            &[&table],
        )
        .await?;

    Ok(rows.iter().map(|row| row.get("name")).collect())
}
