//! Result-row protocol.
//!
//! Remote procedures answer with a sequence of rows or a failure indicator.
//! Id-assigning calls succeed when the first column of the first row is a
//! positive integer. The finalize call returns `(status_code, message)` rows
//! and succeeds only when the highest status code is exactly zero; negative
//! codes are informational.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InfraRiskError, Result};
use crate::models::AttributeValue;

/// One row returned by a remote procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow(pub Vec<AttributeValue>);

impl ResultRow {
    pub fn new(values: Vec<AttributeValue>) -> Self {
        Self(values)
    }

    /// Convenience constructor for `(status, message)` rows
    pub fn status(code: i64, message: impl Into<String>) -> Self {
        Self(vec![AttributeValue::Integer(code), AttributeValue::Text(message.into())])
    }

    pub fn column(&self, index: usize) -> Option<&AttributeValue> {
        self.0.get(index)
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = self
            .0
            .iter()
            .map(|v| match v {
                AttributeValue::Null => "NULL".to_string(),
                AttributeValue::Text(s) => s.clone(),
                other => other.to_json().to_string(),
            })
            .collect();
        write!(f, "({})", cells.join(", "))
    }
}

/// Raw answer of a remote procedure call
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Rows(Vec<ResultRow>),
    /// The call did not produce a result set
    Failed(String),
}

/// A decoded finalize message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: i64,
    pub message: String,
}

/// Consolidated verdict of the finalize call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub messages: Vec<StatusMessage>,
}

impl ImportOutcome {
    pub fn max_status(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.status).max()
    }

    /// True iff the highest returned status code is exactly zero
    pub fn succeeded(&self) -> bool {
        self.max_status() == Some(0)
    }

    pub fn message_texts(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }
}

/// Decode the id returned by an id-assigning procedure.
///
/// On failure every returned row is surfaced before the error is raised.
pub fn decode_assigned_id(procedure: &str, result: CallResult) -> Result<i64> {
    let rows = match result {
        CallResult::Rows(rows) => rows,
        CallResult::Failed(reason) => {
            tracing::error!(procedure, "Remote call returned unexpected results: {}", reason);
            return Err(InfraRiskError::remote(
                procedure,
                format!("returned unexpected results: {}", reason),
            ));
        }
    };

    let id = rows.first().and_then(|row| row.column(0)).and_then(AttributeValue::as_i64);
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => {
            let messages: Vec<String> = rows.iter().map(ToString::to_string).collect();
            for message in &messages {
                tracing::warn!(procedure, "{}", message);
            }
            let reason = if rows.is_empty() {
                "returned no rows".to_string()
            } else {
                format!("returned {} instead of a positive id", rows[0])
            };
            Err(InfraRiskError::RemoteCallFailed { procedure: procedure.to_string(), reason, messages })
        }
    }
}

/// Decode `(status_code, message)` rows, surfacing each message as it is read.
///
/// A well-formed but failing outcome is returned as `Ok`; callers decide how
/// to raise it. Malformed rows are an error.
pub fn decode_import_outcome(
    procedure: &str,
    result: CallResult,
    mut on_message: impl FnMut(&StatusMessage),
) -> Result<ImportOutcome> {
    let rows = match result {
        CallResult::Rows(rows) => rows,
        CallResult::Failed(reason) => {
            tracing::error!(procedure, "Remote call returned unexpected results: {}", reason);
            return Err(InfraRiskError::remote(
                procedure,
                format!("returned unexpected results: {}", reason),
            ));
        }
    };

    let mut messages = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(status) = row.column(0).and_then(AttributeValue::as_i64) else {
            return Err(InfraRiskError::RemoteCallFailed {
                procedure: procedure.to_string(),
                reason: format!("row {} has no integer status code", row),
                messages: messages.iter().map(|m: &StatusMessage| m.message.clone()).collect(),
            });
        };
        let message = match row.column(1) {
            Some(AttributeValue::Text(s)) => s.clone(),
            Some(AttributeValue::Null) | None => String::new(),
            Some(other) => other.to_json().to_string(),
        };
        let decoded = StatusMessage { status, message };
        on_message(&decoded);
        messages.push(decoded);
    }

    if messages.is_empty() {
        return Err(InfraRiskError::remote(procedure, "returned no status rows"));
    }

    Ok(ImportOutcome { messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_positive_id_accepted() {
        let result = CallResult::Rows(vec![ResultRow::new(vec![AttributeValue::Integer(42)])]);
        assert_eq!(decode_assigned_id("SetStudyArea", result).unwrap(), 42);
    }

    #[test]
    fn test_non_positive_id_rejected_with_diagnostics() {
        let result = CallResult::Rows(vec![
            ResultRow::status(-1, "study name already in use"),
            ResultRow::status(0, "rolled back"),
        ]);
        let err = decode_assigned_id("SetStudyArea", result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);
        match err {
            InfraRiskError::RemoteCallFailed { messages, .. } => assert_eq!(messages.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_sequence_and_empty_results_fail() {
        assert!(decode_assigned_id("p", CallResult::Failed("no result set".into())).is_err());
        assert!(decode_assigned_id("p", CallResult::Rows(vec![])).is_err());
        let text_id = CallResult::Rows(vec![ResultRow::new(vec![AttributeValue::Text("abc".into())])]);
        assert!(decode_assigned_id("p", text_id).is_err());
    }

    #[test]
    fn test_outcome_succeeds_only_when_max_status_is_zero() {
        let ok = decode_import_outcome(
            "ImportResults",
            CallResult::Rows(vec![ResultRow::status(0, "imported 3 rows"), ResultRow::status(0, "done")]),
            |_| {},
        )
        .unwrap();
        assert!(ok.succeeded());

        let failed = decode_import_outcome(
            "ImportResults",
            CallResult::Rows(vec![
                ResultRow::status(0, "imported 3 rows"),
                ResultRow::status(2, "unknown processtype_id 9"),
                ResultRow::status(0, "done"),
            ]),
            |_| {},
        )
        .unwrap();
        assert!(!failed.succeeded());
        assert_eq!(failed.max_status(), Some(2));
        assert_eq!(failed.messages.len(), 3);
    }

    #[test]
    fn test_negative_status_beside_zero_succeeds() {
        let outcome = decode_import_outcome(
            "ImportResults",
            CallResult::Rows(vec![ResultRow::status(-1, "info"), ResultRow::status(0, "done")]),
            |_| {},
        )
        .unwrap();
        assert_eq!(outcome.max_status(), Some(0));
        assert!(outcome.succeeded());
    }

    #[test]
    fn test_only_negative_statuses_fail() {
        let outcome = decode_import_outcome(
            "ImportResults",
            CallResult::Rows(vec![ResultRow::status(-1, "warning"), ResultRow::status(-1, "nothing imported")]),
            |_| {},
        )
        .unwrap();
        assert_eq!(outcome.max_status(), Some(-1));
        assert!(!outcome.succeeded());
    }

    #[test]
    fn test_every_message_surfaced_in_order() {
        let mut seen = Vec::new();
        decode_import_outcome(
            "ImportResults",
            CallResult::Rows(vec![ResultRow::status(0, "a"), ResultRow::status(1, "b")]),
            |m| seen.push(m.message.clone()),
        )
        .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_status_row() {
        let result = CallResult::Rows(vec![ResultRow::new(vec![AttributeValue::Text("x".into())])]);
        let err = decode_import_outcome("ImportResults", result, |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);
    }
}
