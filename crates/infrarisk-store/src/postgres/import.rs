//! Bulk append into the durable import table.
//!
//! Rows go in with multi-row `INSERT ... VALUES` statements inside a single
//! transaction. No per-row validation happens here; the import procedure
//! checks the rows afterwards.

use infrarisk_core::config::validate_identifier;
use infrarisk_core::error::Result;
use infrarisk_core::models::AttributeValue;
use infrarisk_core::projection::ImportRow;
use sqlx::{Postgres, QueryBuilder};

use super::transaction::TransactionManager;

/// PostgreSQL limit on bind parameters per statement
const MAX_BIND_PARAMETERS: usize = 65_535;

/// Rows that fit into one statement without exceeding the bind limit
pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMETERS / columns.max(1)).max(1)
}

/// Build one multi-row insert; nulls are written as literals so the column
/// type decides their type
pub fn insert_builder(table: &str, columns: &[&str], rows: &[ImportRow]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("INSERT INTO \"{}\" (", table));
    let mut separated = builder.separated(", ");
    for column in columns {
        separated.push(format!("\"{}\"", column));
    }
    builder.push(") ");

    builder.push_values(rows, |mut b, row| {
        for value in row {
            match value {
                AttributeValue::Null => {
                    b.push("NULL");
                }
                AttributeValue::Boolean(v) => {
                    b.push_bind(*v);
                }
                AttributeValue::Integer(v) => {
                    b.push_bind(*v);
                }
                AttributeValue::Double(v) => {
                    b.push_bind(*v);
                }
                AttributeValue::Text(v) => {
                    b.push_bind(v.clone());
                }
            }
        }
    });
    builder
}

/// Append all rows in one transaction; returns the rows committed
pub async fn append_rows(
    transactions: &TransactionManager,
    table: &str,
    columns: &[&str],
    rows: &[ImportRow],
) -> Result<u64> {
    validate_identifier("import_table", table)?;
    for column in columns {
        validate_identifier("import_column", column)?;
    }
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = transactions.begin(table).await?;
    for chunk in rows.chunks(rows_per_statement(columns.len())) {
        if let Err(e) = tx.execute(insert_builder(table, columns, chunk)).await {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(table, "{}", rollback);
            }
            return Err(e);
        }
        tracing::debug!(table, appended = tx.appended(), total = rows.len(), "Appended chunk");
    }
    tx.commit().await
}
