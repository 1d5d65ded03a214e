//! Account directory storage: account rows keyed by identifier, three
//! uniqueness indexes kept in step with them, optimistic versioning, and
//! resumable crawls, over any [`storage::KeyValueStore`].
//!
//! [`commit::executor::MemoryStore`] is the in-process store implementation.

pub mod accounts;
pub mod commit;
pub mod config;
pub mod error;
pub mod storage;
pub mod telemetry;

pub use accounts::Accounts;
pub use accounts::crawl::AccountCrawlChunk;
pub use accounts::error::{AccountsError, AccountsErrorCode, CreateOutcome};
pub use accounts::model::{Account, AccountProfile, Device};
pub use commit::executor::MemoryStore;
pub use config::{AccountsConfig, MemoryStoreConfig, ReplicationMode};
pub use error::{StoreError, StoreErrorCode};
pub use storage::KeyValueStore;
