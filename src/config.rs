use crate::accounts::error::AccountsError;
use crate::accounts::schema::{ATTR_ACCOUNT_E164, ATTR_PNI, ATTR_USERNAME, KEY_ACCOUNT_UUID};
use crate::storage::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsTables {
    pub accounts: String,
    pub phone_numbers: String,
    pub phone_number_identifiers: String,
    pub usernames: String,
}

impl Default for AccountsTables {
    fn default() -> Self {
        Self {
            accounts: "accounts".into(),
            phone_numbers: "accounts_phone_numbers".into(),
            phone_number_identifiers: "accounts_phone_number_identifiers".into(),
            usernames: "accounts_usernames".into(),
        }
    }
}

/// Runtime configuration for an [`crate::accounts::Accounts`] store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub tables: AccountsTables,
    /// Rows requested per underlying scan call while crawling.
    pub scan_page_size: usize,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            tables: AccountsTables::default(),
            scan_page_size: 100,
        }
    }
}

impl AccountsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AccountsError> {
        let config: Self = serde_json::from_str(json).map_err(|e| AccountsError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_scan_page_size(mut self, scan_page_size: usize) -> Self {
        self.scan_page_size = scan_page_size;
        self
    }

    pub fn validate(&self) -> Result<(), AccountsError> {
        if self.scan_page_size == 0 {
            return Err(AccountsError::InvalidConfig {
                message: "scan_page_size must be at least 1".into(),
            });
        }
        let names = [
            &self.tables.accounts,
            &self.tables.phone_numbers,
            &self.tables.phone_number_identifiers,
            &self.tables.usernames,
        ];
        let mut seen = HashSet::new();
        for name in names {
            if name.is_empty() {
                return Err(AccountsError::InvalidConfig {
                    message: "table names must not be empty".into(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(AccountsError::InvalidConfig {
                    message: format!("table '{name}' is configured more than once"),
                });
            }
        }
        Ok(())
    }

    /// The four tables an account store needs, with their key attributes.
    pub fn table_definitions(&self) -> Vec<TableDefinition> {
        vec![
            TableDefinition::new(&self.tables.accounts, KEY_ACCOUNT_UUID),
            TableDefinition::new(&self.tables.phone_numbers, ATTR_ACCOUNT_E164),
            TableDefinition::new(&self.tables.phone_number_identifiers, ATTR_PNI),
            TableDefinition::new(&self.tables.usernames, ATTR_USERNAME),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplicationMode {
    /// Every commit is immediately visible to eventually consistent reads.
    #[default]
    Synchronous,
    /// Eventually consistent reads only catch up on `MemoryStore::sync_replica`.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    pub max_transaction_items: usize,
    pub replication: ReplicationMode,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_items: 25,
            replication: ReplicationMode::Synchronous,
        }
    }
}

impl MemoryStoreConfig {
    pub fn with_replication(mut self, replication: ReplicationMode) -> Self {
        self.replication = replication;
        self
    }
}
