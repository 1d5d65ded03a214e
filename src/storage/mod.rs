//! The keyed transactional store contract consumed by the account layer, and the
//! row/key primitives shared by its implementations.

pub mod encoded_key;
pub mod keyspace;
pub mod types;

use crate::commit::tx::{Condition, UpdateAction, WriteItem};
use crate::error::StoreError;
use crate::storage::types::{AttributeValue, Item};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub key_attribute: String,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_attribute: key_attribute.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemRequest {
    pub table: String,
    pub key: AttributeValue,
    pub consistent_read: bool,
}

impl GetItemRequest {
    pub fn new(table: impl Into<String>, key: impl Into<AttributeValue>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            consistent_read: false,
        }
    }

    pub fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateItemRequest {
    pub table: String,
    pub key: AttributeValue,
    pub actions: Vec<UpdateAction>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub table: String,
    pub limit: usize,
    pub exclusive_start_key: Option<AttributeValue>,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Key of the last returned item when more rows remain past it.
    pub last_evaluated_key: Option<AttributeValue>,
}

/// Keyed store with conditional single-item writes, bounded multi-item
/// transactions and a forward scan.
///
/// Transactions are all-or-nothing. A cancelled transaction reports one
/// [`crate::commit::tx::CancellationReason`] per requested item, in request order.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>, StoreError>;

    /// Applies `actions` to the item if `condition` holds and returns the full
    /// updated item. A condition failure does not say which clause failed.
    fn update_item(&self, request: UpdateItemRequest) -> Result<Item, StoreError>;

    fn transact_write_items(&self, items: Vec<WriteItem>) -> Result<(), StoreError>;

    fn scan(&self, request: ScanRequest) -> Result<ScanPage, StoreError>;
}
