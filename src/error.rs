use crate::commit::tx::{CancellationCode, CancellationReason};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    Validation,
    TableNotFound,
    ConditionalCheckFailed,
    TransactionConflict,
    TransactionCanceled,
}

impl StoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorCode::Validation => "validation",
            StoreErrorCode::TableNotFound => "table_not_found",
            StoreErrorCode::ConditionalCheckFailed => "conditional_check_failed",
            StoreErrorCode::TransactionConflict => "transaction_conflict",
            StoreErrorCode::TransactionCanceled => "transaction_canceled",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("table '{table}' not found")]
    TableNotFound { table: String },
    #[error("conditional check failed on table '{table}'")]
    ConditionalCheckFailed { table: String },
    #[error("transaction conflict on table '{table}'")]
    TransactionConflict { table: String },
    #[error("transaction cancelled, reasons [{}]", join_codes(.reasons))]
    TransactionCanceled { reasons: Vec<CancellationReason> },
}

fn join_codes(reasons: &[CancellationReason]) -> String {
    reasons
        .iter()
        .map(|r| r.code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::Validation(_) => StoreErrorCode::Validation,
            StoreError::TableNotFound { .. } => StoreErrorCode::TableNotFound,
            StoreError::ConditionalCheckFailed { .. } => StoreErrorCode::ConditionalCheckFailed,
            StoreError::TransactionConflict { .. } => StoreErrorCode::TransactionConflict,
            StoreError::TransactionCanceled { .. } => StoreErrorCode::TransactionCanceled,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Per-item cancellation codes, if this is a cancelled transaction.
    pub fn cancellation_codes(&self) -> Option<Vec<CancellationCode>> {
        match self {
            StoreError::TransactionCanceled { reasons } => {
                Some(reasons.iter().map(|r| r.code).collect())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreError, StoreErrorCode};
    use crate::commit::tx::{CancellationCode, CancellationReason};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(
            StoreErrorCode::ConditionalCheckFailed.as_str(),
            "conditional_check_failed"
        );
        assert_eq!(
            StoreErrorCode::TransactionConflict.as_str(),
            "transaction_conflict"
        );
    }

    #[test]
    fn cancelled_transaction_lists_every_code_in_order() {
        let err = StoreError::TransactionCanceled {
            reasons: vec![
                CancellationReason::none(),
                CancellationReason::new(CancellationCode::ConditionalCheckFailed, None),
                CancellationReason::new(CancellationCode::TransactionConflict, None),
            ],
        };
        assert_eq!(err.code_str(), "transaction_canceled");
        assert_eq!(
            err.to_string(),
            "transaction cancelled, reasons [None, ConditionalCheckFailed, TransactionConflict]"
        );
        assert_eq!(
            err.cancellation_codes(),
            Some(vec![
                CancellationCode::None,
                CancellationCode::ConditionalCheckFailed,
                CancellationCode::TransactionConflict,
            ])
        );
    }
}
