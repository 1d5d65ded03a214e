use crate::accounts::error::AccountsError;
use crate::commit::tx::{CancellationCode, CancellationReason};
use crate::error::StoreError;
use crate::storage::types::Item;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-item outcome of an aborted account transaction, read positionally
/// against the write list the operation built.
#[derive(Debug)]
pub(crate) struct CancelledTransaction {
    operation: &'static str,
    reasons: Vec<CancellationReason>,
}

impl CancelledTransaction {
    /// Splits a transaction error into a cancellation to interpret, or any other
    /// store failure passed through unchanged.
    pub(crate) fn from_store_error(
        operation: &'static str,
        err: StoreError,
    ) -> Result<Self, AccountsError> {
        match err {
            StoreError::TransactionCanceled { reasons } => Ok(Self { operation, reasons }),
            other => Err(AccountsError::Store(other)),
        }
    }

    pub(crate) fn condition_failed(&self, position: usize) -> bool {
        self.reasons
            .get(position)
            .is_some_and(CancellationReason::is_condition_failure)
    }

    /// Stored item reported for a failed condition at `position`.
    pub(crate) fn old_item(&self, position: usize) -> Option<&Item> {
        self.reasons.get(position).and_then(|r| r.item.as_ref())
    }

    pub(crate) fn has_conflict(&self) -> bool {
        self.reasons.iter().any(CancellationReason::is_conflict)
    }

    pub(crate) fn codes(&self) -> Vec<CancellationCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }

    pub(crate) fn contested(&self, account_id: Uuid) -> AccountsError {
        debug!(
            operation = self.operation,
            account = %account_id,
            codes = ?self.codes(),
            "contested lock"
        );
        AccountsError::ContestedLock { account_id }
    }

    pub(crate) fn unexpected(&self) -> AccountsError {
        let codes = self.codes();
        warn!(
            operation = self.operation,
            codes = ?codes,
            "unexpected transaction cancellation"
        );
        AccountsError::UnexpectedTransactionFailure {
            operation: self.operation,
            codes,
        }
    }
}
