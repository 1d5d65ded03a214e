use crate::accounts::error::AccountsErrorCode;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountsOperation {
    Create,
    ChangeNumber,
    SetUsername,
    ClearUsername,
    Update,
    GetByPhoneNumber,
    GetByUsername,
    GetByPhoneNumberIdentifier,
    GetByAccountIdentifier,
    Delete,
    GetAllFromStart,
    GetAllFrom,
}

impl AccountsOperation {
    pub const ALL: [AccountsOperation; 12] = [
        AccountsOperation::Create,
        AccountsOperation::ChangeNumber,
        AccountsOperation::SetUsername,
        AccountsOperation::ClearUsername,
        AccountsOperation::Update,
        AccountsOperation::GetByPhoneNumber,
        AccountsOperation::GetByUsername,
        AccountsOperation::GetByPhoneNumberIdentifier,
        AccountsOperation::GetByAccountIdentifier,
        AccountsOperation::Delete,
        AccountsOperation::GetAllFromStart,
        AccountsOperation::GetAllFrom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountsOperation::Create => "create",
            AccountsOperation::ChangeNumber => "change_number",
            AccountsOperation::SetUsername => "set_username",
            AccountsOperation::ClearUsername => "clear_username",
            AccountsOperation::Update => "update",
            AccountsOperation::GetByPhoneNumber => "get_by_phone_number",
            AccountsOperation::GetByUsername => "get_by_username",
            AccountsOperation::GetByPhoneNumberIdentifier => "get_by_phone_number_identifier",
            AccountsOperation::GetByAccountIdentifier => "get_by_account_identifier",
            AccountsOperation::Delete => "delete",
            AccountsOperation::GetAllFromStart => "get_all_from_start",
            AccountsOperation::GetAllFrom => "get_all_from",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTelemetryEvent {
    pub op: AccountsOperation,
    pub latency_micros: u64,
    pub ok: bool,
    /// Error code when `ok` is false.
    pub error: Option<AccountsErrorCode>,
}

/// Receives one event per account store call.
pub trait AccountsTelemetryHook: Send + Sync {
    fn on_operation(&self, _event: &OperationTelemetryEvent) {}
}

#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl AccountsTelemetryHook for NoopTelemetry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationMetrics {
    pub calls: u64,
    pub errors: u64,
    pub contested_locks: u64,
    pub total_latency_micros: u64,
}

impl OperationMetrics {
    pub fn avg_latency_micros(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_latency_micros / self.calls
        }
    }
}

#[derive(Debug, Default)]
struct OperationCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    contested_locks: AtomicU64,
    total_latency_micros: AtomicU64,
}

/// Lock-free per-operation counters and latency totals.
#[derive(Debug, Default)]
pub struct AccountsMetrics {
    counters: [OperationCounters; AccountsOperation::ALL.len()],
}

impl AccountsMetrics {
    pub fn snapshot(&self, op: AccountsOperation) -> OperationMetrics {
        let c = &self.counters[op.index()];
        OperationMetrics {
            calls: c.calls.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            contested_locks: c.contested_locks.load(Ordering::Relaxed),
            total_latency_micros: c.total_latency_micros.load(Ordering::Relaxed),
        }
    }
}

impl AccountsTelemetryHook for AccountsMetrics {
    fn on_operation(&self, event: &OperationTelemetryEvent) {
        let c = &self.counters[event.op.index()];
        c.calls.fetch_add(1, Ordering::Relaxed);
        c.total_latency_micros
            .fetch_add(event.latency_micros, Ordering::Relaxed);
        if !event.ok {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        if event.error == Some(AccountsErrorCode::ContestedLock) {
            c.contested_locks.fetch_add(1, Ordering::Relaxed);
        }
    }
}
