mod coordinator;

pub use coordinator::ItemLockGuard;

use crate::commit::apply::apply_write;
use crate::commit::assertions::{evaluate_condition, validate_condition};
use crate::commit::tx::{CancellationCode, CancellationReason, Condition, WriteItem};
use crate::config::{MemoryStoreConfig, ReplicationMode};
use crate::error::StoreError;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::keyspace::Keyspace;
use crate::storage::types::{AttributeValue, Item};
use crate::storage::{
    GetItemRequest, KeyValueStore, ScanPage, ScanRequest, TableDefinition, UpdateItemRequest,
};
use coordinator::{ItemLockKey, ItemLockManager};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreMetrics {
    pub commits_total: u64,
    pub cancellations_total: u64,
    pub condition_failures: u64,
    pub write_conflicts: u64,
}

#[derive(Debug, Default)]
struct StoreTelemetry {
    commits_total: AtomicU64,
    cancellations_total: AtomicU64,
    condition_failures: AtomicU64,
    write_conflicts: AtomicU64,
}

/// In-process [`KeyValueStore`].
///
/// Committed state lives in a structurally shared [`Keyspace`]; a second copy
/// serves eventually consistent reads and lags behind according to the
/// configured [`ReplicationMode`]. Writers take non-blocking per-item locks, so
/// two writers touching the same item at the same time see a
/// [`CancellationCode::TransactionConflict`] instead of queueing.
///
/// [`MemoryStore::lock_item`] and [`MemoryStore::sync_replica`] with
/// [`ReplicationMode::Manual`] are test aids. They let callers stage a write
/// conflict or a stale replica on purpose; nothing on the account paths uses
/// them.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    primary: RwLock<Keyspace>,
    replica: RwLock<Keyspace>,
    locks: ItemLockManager,
    telemetry: StoreTelemetry,
}

struct PreparedWrite<'a> {
    write: &'a WriteItem,
    key: AttributeValue,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            primary: RwLock::new(Keyspace::default()),
            replica: RwLock::new(Keyspace::default()),
            locks: ItemLockManager::default(),
            telemetry: StoreTelemetry::default(),
        }
    }

    pub fn with_tables(config: MemoryStoreConfig, tables: &[TableDefinition]) -> Self {
        let store = Self::new(config);
        for table in tables {
            store.create_table(table);
        }
        store
    }

    pub fn create_table(&self, table: &TableDefinition) {
        let mut primary = self.primary.write();
        primary.create_table(&table.name, &table.key_attribute);
        self.replica
            .write()
            .create_table(&table.name, &table.key_attribute);
    }

    /// Publishes the latest committed state to eventually consistent readers.
    pub fn sync_replica(&self) {
        let primary = self.primary.read();
        *self.replica.write() = primary.clone();
    }

    /// Test aid: holds the write lock on one item, as an in-flight writer
    /// would, until the guard is dropped. Any transaction touching the item in
    /// the meantime is cancelled with a conflict.
    pub fn lock_item(
        &self,
        table: &str,
        key: impl Into<AttributeValue>,
    ) -> Result<ItemLockGuard<'_>, StoreError> {
        let key = key.into();
        let lock_key = (table.to_string(), EncodedKey::from_value(&key));
        self.locks
            .try_acquire_all(vec![lock_key])
            .map_err(|_| StoreError::TransactionConflict {
                table: table.to_string(),
            })
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.primary.read().len(table)
    }

    pub fn commit_seq(&self) -> u64 {
        self.primary.read().commit_seq()
    }

    pub fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            commits_total: self.telemetry.commits_total.load(Ordering::Relaxed),
            cancellations_total: self.telemetry.cancellations_total.load(Ordering::Relaxed),
            condition_failures: self.telemetry.condition_failures.load(Ordering::Relaxed),
            write_conflicts: self.telemetry.write_conflicts.load(Ordering::Relaxed),
        }
    }

    fn prepare<'a>(&self, writes: &'a [WriteItem]) -> Result<Vec<PreparedWrite<'a>>, StoreError> {
        if writes.is_empty() {
            return Err(StoreError::Validation("transaction has no items".into()));
        }
        if writes.len() > self.config.max_transaction_items {
            return Err(StoreError::Validation(format!(
                "transaction has {} items, limit is {}",
                writes.len(),
                self.config.max_transaction_items
            )));
        }
        let primary = self.primary.read();
        let mut seen = HashSet::with_capacity(writes.len());
        let mut prepared = Vec::with_capacity(writes.len());
        for write in writes {
            let key_attribute =
                primary
                    .key_attribute(&write.table)
                    .ok_or_else(|| StoreError::TableNotFound {
                        table: write.table.clone(),
                    })?;
            let key = write.key(key_attribute).cloned().ok_or_else(|| {
                StoreError::Validation(format!(
                    "write to '{}' is missing key attribute '{key_attribute}'",
                    write.table
                ))
            })?;
            if let Some(condition) = &write.condition {
                validate_condition(condition)?;
            }
            if !seen.insert((write.table.clone(), EncodedKey::from_value(&key))) {
                return Err(StoreError::Validation(format!(
                    "transaction touches '{}' key {key} more than once",
                    write.table
                )));
            }
            prepared.push(PreparedWrite { write, key });
        }
        Ok(prepared)
    }

    fn cancel(&self, reasons: Vec<CancellationReason>) -> StoreError {
        self.telemetry
            .cancellations_total
            .fetch_add(1, Ordering::Relaxed);
        for reason in &reasons {
            match reason.code {
                CancellationCode::ConditionalCheckFailed => {
                    self.telemetry
                        .condition_failures
                        .fetch_add(1, Ordering::Relaxed);
                }
                CancellationCode::TransactionConflict => {
                    self.telemetry.write_conflicts.fetch_add(1, Ordering::Relaxed);
                }
                CancellationCode::None => {}
            }
        }
        StoreError::TransactionCanceled { reasons }
    }

    /// Checks every condition and applies every write atomically. Returns the
    /// resulting item per write (`None` for deletes).
    fn commit(&self, writes: &[WriteItem]) -> Result<Vec<Option<Item>>, StoreError> {
        let prepared = self.prepare(writes)?;

        let lock_keys: Vec<ItemLockKey> = prepared
            .iter()
            .map(|p| (p.write.table.clone(), EncodedKey::from_value(&p.key)))
            .collect();
        let _guard = match self.locks.try_acquire_all(lock_keys.clone()) {
            Ok(guard) => guard,
            Err(conflicts) => {
                debug!(items = writes.len(), "write conflicts with in-flight writer");
                let reasons = lock_keys
                    .iter()
                    .map(|k| {
                        if conflicts.contains(k) {
                            CancellationReason::new(CancellationCode::TransactionConflict, None)
                        } else {
                            CancellationReason::none()
                        }
                    })
                    .collect();
                return Err(self.cancel(reasons));
            }
        };

        let mut primary = self.primary.write();
        let mut any_failed = false;
        let reasons: Vec<CancellationReason> = prepared
            .iter()
            .map(|p| {
                let current = primary.get_item(&p.write.table, &p.key);
                let holds = p
                    .write
                    .condition
                    .as_ref()
                    .is_none_or(|c: &Condition| evaluate_condition(current, c));
                if holds {
                    CancellationReason::none()
                } else {
                    any_failed = true;
                    let item = if p.write.return_old_on_condition_failure {
                        current.cloned()
                    } else {
                        None
                    };
                    CancellationReason::new(CancellationCode::ConditionalCheckFailed, item)
                }
            })
            .collect();
        if any_failed {
            return Err(self.cancel(reasons));
        }

        // Apply to a copy so a write that fails half way leaves nothing behind.
        let mut working = primary.clone();
        let mut results = Vec::with_capacity(prepared.len());
        for p in &prepared {
            results.push(apply_write(&mut working, p.write)?);
        }
        working.advance_seq();
        *primary = working;
        if self.config.replication == ReplicationMode::Synchronous {
            *self.replica.write() = primary.clone();
        }
        self.telemetry.commits_total.fetch_add(1, Ordering::Relaxed);
        Ok(results)
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>, StoreError> {
        let keyspace = if request.consistent_read {
            self.primary.read()
        } else {
            self.replica.read()
        };
        if !keyspace.has_table(&request.table) {
            return Err(StoreError::TableNotFound {
                table: request.table,
            });
        }
        Ok(keyspace.get_item(&request.table, &request.key).cloned())
    }

    fn update_item(&self, request: UpdateItemRequest) -> Result<Item, StoreError> {
        let UpdateItemRequest {
            table,
            key,
            actions,
            condition,
        } = request;
        let mut write = WriteItem::update(table.clone(), key, actions);
        write.condition = condition;
        match self.commit(std::slice::from_ref(&write)) {
            Ok(mut results) => results.pop().flatten().ok_or_else(|| {
                StoreError::Validation("update produced no item".into())
            }),
            Err(StoreError::TransactionCanceled { reasons }) => {
                if reasons.iter().any(CancellationReason::is_conflict) {
                    Err(StoreError::TransactionConflict { table })
                } else {
                    Err(StoreError::ConditionalCheckFailed { table })
                }
            }
            Err(other) => Err(other),
        }
    }

    fn transact_write_items(&self, items: Vec<WriteItem>) -> Result<(), StoreError> {
        self.commit(&items).map(|_| ())
    }

    fn scan(&self, request: ScanRequest) -> Result<ScanPage, StoreError> {
        if request.limit == 0 {
            return Err(StoreError::Validation("scan limit must be at least 1".into()));
        }
        let keyspace = if request.consistent_read {
            self.primary.read()
        } else {
            self.replica.read()
        };
        let Some(key_attribute) = keyspace.key_attribute(&request.table) else {
            return Err(StoreError::TableNotFound {
                table: request.table,
            });
        };
        let (items, more) = keyspace.scan(
            &request.table,
            request.exclusive_start_key.as_ref(),
            request.limit,
        );
        let last_evaluated_key = if more {
            items.last().and_then(|i| i.get(key_attribute)).cloned()
        } else {
            None
        };
        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }
}
