use crate::accounts::codec::CodecError;
use crate::accounts::model::Account;
use crate::commit::tx::CancellationCode;
use crate::error::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountsErrorCode {
    Encoding,
    UsernameUnavailable,
    ContestedLock,
    IdentifierConflict,
    InvalidCandidate,
    UnexpectedTransactionFailure,
    CorruptRecord,
    DanglingConstraint,
    InvalidConfig,
    Store,
}

impl AccountsErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountsErrorCode::Encoding => "encoding",
            AccountsErrorCode::UsernameUnavailable => "username_unavailable",
            AccountsErrorCode::ContestedLock => "contested_lock",
            AccountsErrorCode::IdentifierConflict => "identifier_conflict",
            AccountsErrorCode::InvalidCandidate => "invalid_candidate",
            AccountsErrorCode::UnexpectedTransactionFailure => "unexpected_transaction_failure",
            AccountsErrorCode::CorruptRecord => "corrupt_record",
            AccountsErrorCode::DanglingConstraint => "dangling_constraint",
            AccountsErrorCode::InvalidConfig => "invalid_config",
            AccountsErrorCode::Store => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error(transparent)]
    Encoding(#[from] CodecError),
    #[error("username '{username}' is not available")]
    UsernameUnavailable { username: String },
    #[error("contested optimistic lock on account {account_id}")]
    ContestedLock { account_id: Uuid },
    #[error("account {account_id} already exists with a different phone number")]
    IdentifierConflict { account_id: Uuid },
    #[error("account {account_id} cannot be created: {reason}")]
    InvalidCandidate {
        account_id: Uuid,
        reason: &'static str,
    },
    #[error("{operation} failed, cancellation reasons [{}]", join_codes(.codes))]
    UnexpectedTransactionFailure {
        operation: &'static str,
        codes: Vec<CancellationCode>,
    },
    #[error("stored account row is missing attribute '{attribute}'")]
    CorruptRecord { attribute: &'static str },
    #[error("index '{table}' points at account {owner}, which does not exist")]
    DanglingConstraint { table: String, owner: Uuid },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_codes(codes: &[CancellationCode]) -> String {
    codes
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AccountsError {
    pub fn code(&self) -> AccountsErrorCode {
        match self {
            AccountsError::Encoding(_) => AccountsErrorCode::Encoding,
            AccountsError::UsernameUnavailable { .. } => AccountsErrorCode::UsernameUnavailable,
            AccountsError::ContestedLock { .. } => AccountsErrorCode::ContestedLock,
            AccountsError::IdentifierConflict { .. } => AccountsErrorCode::IdentifierConflict,
            AccountsError::InvalidCandidate { .. } => AccountsErrorCode::InvalidCandidate,
            AccountsError::UnexpectedTransactionFailure { .. } => {
                AccountsErrorCode::UnexpectedTransactionFailure
            }
            AccountsError::CorruptRecord { .. } => AccountsErrorCode::CorruptRecord,
            AccountsError::DanglingConstraint { .. } => AccountsErrorCode::DanglingConstraint,
            AccountsError::InvalidConfig { .. } => AccountsErrorCode::InvalidConfig,
            AccountsError::Store(_) => AccountsErrorCode::Store,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Recoverable signals: the caller can re-read and retry, or pick another name.
    /// Everything else indicates a bug, corrupt data, or a store failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AccountsError::UsernameUnavailable { .. } | AccountsError::ContestedLock { .. }
        )
    }
}

/// Result of a successful [`crate::accounts::Accounts::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new account row and its index entries were written.
    Created(Account),
    /// The phone number or its identifier was already registered; the candidate
    /// was merged onto the existing account, whose identifier it now carries.
    Merged(Account),
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn account(&self) -> &Account {
        match self {
            CreateOutcome::Created(a) | CreateOutcome::Merged(a) => a,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            CreateOutcome::Created(a) | CreateOutcome::Merged(a) => a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountsError, AccountsErrorCode};
    use crate::commit::tx::CancellationCode;
    use uuid::Uuid;

    #[test]
    fn only_username_and_lock_signals_are_recoverable() {
        let id = Uuid::nil();
        assert!(AccountsError::ContestedLock { account_id: id }.is_recoverable());
        assert!(
            AccountsError::UsernameUnavailable {
                username: "n".into()
            }
            .is_recoverable()
        );
        assert!(!AccountsError::IdentifierConflict { account_id: id }.is_recoverable());
        assert!(!AccountsError::CorruptRecord { attribute: "D" }.is_recoverable());
    }

    #[test]
    fn unexpected_failure_lists_all_codes() {
        let err = AccountsError::UnexpectedTransactionFailure {
            operation: "create",
            codes: vec![
                CancellationCode::TransactionConflict,
                CancellationCode::None,
                CancellationCode::None,
            ],
        };
        assert_eq!(err.code(), AccountsErrorCode::UnexpectedTransactionFailure);
        assert_eq!(
            err.to_string(),
            "create failed, cancellation reasons [TransactionConflict, None, None]"
        );
    }
}
