//! Stored procedure calls.
//!
//! Procedures are invoked as set-returning functions with bound parameters;
//! only the procedure name is spliced into the statement, and it is checked
//! to be a plain identifier first.

use infrarisk_core::config::validate_identifier;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::models::AttributeValue;
use infrarisk_core::protocol::{CallResult, ResultRow};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};

/// One bound procedure argument
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureArg {
    Integer(Option<i64>),
    Text(Option<String>),
}

/// `SELECT * FROM "name"($1, ..., $n)`
pub fn procedure_sql(name: &str, arity: usize) -> String {
    let params: Vec<String> = (1..=arity).map(|i| format!("${}", i)).collect();
    format!("SELECT * FROM \"{}\"({})", name, params.join(", "))
}

/// Call a procedure and collect its rows.
///
/// A database error is reported as [`CallResult::Failed`] so the caller's
/// protocol decoding produces the diagnostic.
pub async fn call_procedure(pool: &PgPool, name: &str, args: &[ProcedureArg]) -> Result<CallResult> {
    validate_identifier("procedure", name)?;
    let sql = procedure_sql(name, args.len());

    let mut query = sqlx::query(&sql);
    for arg in args {
        query = match arg {
            ProcedureArg::Integer(value) => query.bind(*value),
            ProcedureArg::Text(value) => query.bind(value.clone()),
        };
    }

    match query.fetch_all(pool).await {
        Ok(rows) => {
            tracing::debug!(procedure = name, rows = rows.len(), "Procedure returned");
            Ok(CallResult::Rows(rows.iter().map(decode_row).collect()))
        }
        Err(e) => {
            tracing::warn!(procedure = name, "Procedure call failed: {}", e);
            Ok(CallResult::Failed(e.to_string()))
        }
    }
}

fn decode_row(row: &PgRow) -> ResultRow {
    ResultRow::new(
        row.columns()
            .iter()
            .map(|column| decode_cell(row, column.ordinal(), column.type_info().name()))
            .collect(),
    )
}

fn decode_cell(row: &PgRow, index: usize, type_name: &str) -> AttributeValue {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| AttributeValue::Integer(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| AttributeValue::Integer(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index).ok().flatten().map(AttributeValue::Integer),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| AttributeValue::Double(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).ok().flatten().map(AttributeValue::Double),
        "BOOL" => row.try_get::<Option<bool>, _>(index).ok().flatten().map(AttributeValue::Boolean),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index).ok().flatten().map(AttributeValue::Text)
        }
        other => {
            tracing::debug!(column = index, type_name = other, "Unsupported result column type");
            None
        }
    };
    value.unwrap_or_default()
}

/// Names from `names` with no matching function in the database
pub async fn missing_procedures(pool: &PgPool, names: &[&str]) -> Result<Vec<String>> {
    let wanted: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let found: Vec<(String,)> =
        sqlx::query_as("SELECT proname::text FROM pg_catalog.pg_proc WHERE proname = ANY($1)")
            .bind(&wanted)
            .fetch_all(pool)
            .await
            .map_err(|e| InfraRiskError::remote("pg_proc", format!("Failed to list procedures: {}", e)))?;

    Ok(wanted.into_iter().filter(|name| !found.iter().any(|(f,)| f == name)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_sql() {
        assert_eq!(procedure_sql("cmrSP_importResults", 1), r#"SELECT * FROM "cmrSP_importResults"($1)"#);
        assert_eq!(
            procedure_sql("cmrSP_defineInputData", 5),
            r#"SELECT * FROM "cmrSP_defineInputData"($1, $2, $3, $4, $5)"#
        );
    }

    #[tokio::test]
    async fn test_rejects_non_identifier_before_connecting() {
        let pool = PgPool::connect_lazy("postgresql://localhost/cmr").unwrap();
        let err = call_procedure(&pool, "x\"; DROP TABLE y; --", &[]).await.unwrap_err();
        assert_eq!(err.kind(), infrarisk_core::ErrorKind::Config);
    }
}
