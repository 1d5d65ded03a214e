//! The account directory: account rows plus the three uniqueness indexes
//! (phone number, phone number identifier, username), always written together
//! in one store transaction.
//!
//! Mutations are optimistic. Callers pass the account as they last read it;
//! the write only applies if the stored version still matches, and a lost race
//! is reported as [`AccountsError::ContestedLock`]. Every mutation returns a
//! new [`Account`] carrying the advanced version and leaves the caller's value
//! untouched, whether it succeeds or fails.

mod cancellation;
pub mod codec;
pub mod crawl;
pub mod error;
pub mod model;
pub mod schema;

use crate::accounts::cancellation::CancelledTransaction;
use crate::accounts::codec::{AccountCodec, MsgpackAccountCodec};
use crate::accounts::crawl::{AccountCrawlChunk, CrawlRequest, crawl_chunk};
use crate::accounts::error::{AccountsError, CreateOutcome};
use crate::accounts::model::{Account, INITIAL_VERSION};
use crate::accounts::schema::{
    ATTR_ACCOUNT_DATA, ATTR_ACCOUNT_E164, ATTR_CANONICALLY_DISCOVERABLE, ATTR_PNI, ATTR_USERNAME,
    ATTR_VERSION, KEY_ACCOUNT_UUID, account_from_item, account_item, constraint_item,
    encode_payload,
};
use crate::commit::tx::{Condition, UpdateAction, WriteItem};
use crate::config::AccountsConfig;
use crate::error::StoreError;
use crate::storage::types::{AttributeValue, Item};
use crate::storage::{GetItemRequest, KeyValueStore, UpdateItemRequest};
use crate::telemetry::{
    AccountsOperation, AccountsTelemetryHook, NoopTelemetry, OperationTelemetryEvent,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

// Write positions inside the create transaction.
const CREATE_PHONE_INDEX: usize = 0;
const CREATE_PNI_INDEX: usize = 1;
const CREATE_ACCOUNT_ROW: usize = 2;

// Write position of the versioned row update inside change_number.
const CHANGE_NUMBER_ACCOUNT_ROW: usize = 4;

// Write positions inside set_username.
const SET_USERNAME_INDEX: usize = 0;
const SET_USERNAME_ACCOUNT_ROW: usize = 1;

const CLEAR_USERNAME_ACCOUNT_ROW: usize = 0;

pub struct Accounts {
    store: Arc<dyn KeyValueStore>,
    codec: Arc<dyn AccountCodec>,
    config: AccountsConfig,
    telemetry: Arc<dyn AccountsTelemetryHook>,
}

impl Accounts {
    pub fn new(store: Arc<dyn KeyValueStore>, config: AccountsConfig) -> Result<Self, AccountsError> {
        config.validate()?;
        Ok(Self {
            store,
            codec: Arc::new(MsgpackAccountCodec),
            config,
            telemetry: Arc::new(NoopTelemetry),
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn AccountCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn AccountsTelemetryHook>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &AccountsConfig {
        &self.config
    }

    /// Registers a new account, or merges the candidate onto the account that
    /// already owns its phone number or phone number identifier.
    ///
    /// The merge adopts the existing account's identifier, number, phone number
    /// identifier, username and version, then writes the candidate's payload
    /// over it with [`Accounts::update`]. Calling `create` twice with the same
    /// account therefore yields `Created` and then `Merged`.
    ///
    /// The candidate must carry the initial version. Any username it carries is
    /// ignored; names are claimed with [`Accounts::set_username`].
    pub fn create(&self, account: &Account) -> Result<CreateOutcome, AccountsError> {
        self.observe(AccountsOperation::Create, || self.create_inner(account))
    }

    /// Moves the account to a new phone number and phone number identifier.
    ///
    /// The new number must not belong to another account; if it does the
    /// transaction is cancelled and reported as an unexpected failure.
    pub fn change_number(
        &self,
        account: &Account,
        number: &str,
        phone_number_identifier: Uuid,
    ) -> Result<Account, AccountsError> {
        self.observe(AccountsOperation::ChangeNumber, || {
            self.change_number_inner(account, number, phone_number_identifier)
        })
    }

    /// Reserves `username` for the account, releasing any different name it held.
    pub fn set_username(&self, account: &Account, username: &str) -> Result<Account, AccountsError> {
        self.observe(AccountsOperation::SetUsername, || {
            self.set_username_inner(account, username)
        })
    }

    /// Releases the account's username. Accounts without one are returned as-is.
    pub fn clear_username(&self, account: &Account) -> Result<Account, AccountsError> {
        self.observe(AccountsOperation::ClearUsername, || {
            self.clear_username_inner(account)
        })
    }

    /// Rewrites the payload and discoverability flag of an existing account.
    pub fn update(&self, account: &Account) -> Result<Account, AccountsError> {
        self.observe(AccountsOperation::Update, || self.update_inner(account))
    }

    pub fn get_by_phone_number(&self, number: &str) -> Result<Option<Account>, AccountsError> {
        self.observe(AccountsOperation::GetByPhoneNumber, || {
            self.get_by_index(&self.config.tables.phone_numbers, AttributeValue::from(number))
        })
    }

    pub fn get_by_username(&self, username: &str) -> Result<Option<Account>, AccountsError> {
        self.observe(AccountsOperation::GetByUsername, || {
            self.get_by_index(&self.config.tables.usernames, AttributeValue::from(username))
        })
    }

    pub fn get_by_phone_number_identifier(
        &self,
        phone_number_identifier: Uuid,
    ) -> Result<Option<Account>, AccountsError> {
        self.observe(AccountsOperation::GetByPhoneNumberIdentifier, || {
            self.get_by_index(
                &self.config.tables.phone_number_identifiers,
                AttributeValue::from_uuid(phone_number_identifier),
            )
        })
    }

    pub fn get_by_account_identifier(&self, uuid: Uuid) -> Result<Option<Account>, AccountsError> {
        self.observe(AccountsOperation::GetByAccountIdentifier, || {
            self.read_account(uuid)
        })
    }

    /// Removes the account row and every index entry it owns. Deleting an
    /// unknown identifier succeeds without writing anything.
    pub fn delete(&self, uuid: Uuid) -> Result<(), AccountsError> {
        self.observe(AccountsOperation::Delete, || self.delete_inner(uuid))
    }

    /// First chunk of a crawl over every account, in identifier order.
    pub fn get_all_from_start(&self, max_count: usize) -> Result<AccountCrawlChunk, AccountsError> {
        self.observe(AccountsOperation::GetAllFromStart, || {
            self.crawl(None, max_count)
        })
    }

    /// Next chunk of a crawl, starting strictly after `last_uuid`.
    pub fn get_all_from(
        &self,
        last_uuid: Uuid,
        max_count: usize,
    ) -> Result<AccountCrawlChunk, AccountsError> {
        self.observe(AccountsOperation::GetAllFrom, || {
            self.crawl(Some(last_uuid), max_count)
        })
    }

    fn observe<T>(
        &self,
        op: AccountsOperation,
        f: impl FnOnce() -> Result<T, AccountsError>,
    ) -> Result<T, AccountsError> {
        let started = Instant::now();
        let result = f();
        let (ok, error) = match &result {
            Ok(_) => (true, None),
            Err(err) => (false, Some(err.code())),
        };
        self.telemetry.on_operation(&OperationTelemetryEvent {
            op,
            latency_micros: started.elapsed().as_micros() as u64,
            ok,
            error,
        });
        result
    }

    fn create_inner(&self, account: &Account) -> Result<CreateOutcome, AccountsError> {
        if account.version != INITIAL_VERSION {
            return Err(AccountsError::InvalidCandidate {
                account_id: account.uuid,
                reason: "version must be at its initial value",
            });
        }
        let tables = &self.config.tables;
        let mut created = account.clone();
        // Usernames are reserved through set_username only.
        created.username = None;
        created.canonically_discoverable = account.should_be_visible_in_directory();

        let writes = vec![
            WriteItem::put(
                &tables.phone_numbers,
                constraint_item(
                    ATTR_ACCOUNT_E164,
                    AttributeValue::from(account.number.as_str()),
                    account.uuid,
                ),
            )
            .with_condition(Condition::not_exists(ATTR_ACCOUNT_E164))
            .returning_old_on_failure(),
            WriteItem::put(
                &tables.phone_number_identifiers,
                constraint_item(
                    ATTR_PNI,
                    AttributeValue::from_uuid(account.phone_number_identifier),
                    account.uuid,
                ),
            )
            .with_condition(Condition::not_exists(ATTR_PNI))
            .returning_old_on_failure(),
            WriteItem::put(&tables.accounts, account_item(self.codec.as_ref(), &created)?)
                .with_condition(
                    Condition::not_exists(KEY_ACCOUNT_UUID)
                        .or(Condition::equals(ATTR_ACCOUNT_E164, account.number.as_str())),
                ),
        ];

        let err = match self.store.transact_write_items(writes) {
            Ok(()) => return Ok(CreateOutcome::Created(created)),
            Err(err) => err,
        };
        let cancelled =
            CancelledTransaction::from_store_error(AccountsOperation::Create.as_str(), err)?;

        if cancelled.condition_failed(CREATE_ACCOUNT_ROW) {
            return Err(AccountsError::IdentifierConflict {
                account_id: account.uuid,
            });
        }
        for (position, table) in [
            (CREATE_PHONE_INDEX, &tables.phone_numbers),
            (CREATE_PNI_INDEX, &tables.phone_number_identifiers),
        ] {
            if !cancelled.condition_failed(position) {
                continue;
            }
            let owner = cancelled
                .old_item(position)
                .and_then(|entry| entry.get_uuid(KEY_ACCOUNT_UUID))
                .ok_or_else(|| cancelled.unexpected())?;
            return self
                .merge_into_existing(account, owner, table)
                .map(CreateOutcome::Merged);
        }
        if cancelled.has_conflict() {
            return Err(cancelled.contested(account.uuid));
        }
        Err(cancelled.unexpected())
    }

    fn merge_into_existing(
        &self,
        candidate: &Account,
        owner: Uuid,
        index_table: &str,
    ) -> Result<Account, AccountsError> {
        let existing =
            self.read_account(owner)?
                .ok_or_else(|| AccountsError::DanglingConstraint {
                    table: index_table.to_string(),
                    owner,
                })?;
        debug!(
            candidate = %candidate.uuid,
            existing = %existing.uuid,
            index = index_table,
            "create collided with an existing account, merging"
        );
        let mut merged = candidate.clone();
        merged.uuid = existing.uuid;
        merged.number = existing.number;
        merged.phone_number_identifier = existing.phone_number_identifier;
        merged.username = existing.username;
        merged.version = existing.version;
        self.update_inner(&merged)
    }

    fn change_number_inner(
        &self,
        account: &Account,
        number: &str,
        phone_number_identifier: Uuid,
    ) -> Result<Account, AccountsError> {
        let tables = &self.config.tables;
        let mut changed = account.clone();
        changed.number = number.to_string();
        changed.phone_number_identifier = phone_number_identifier;
        changed.canonically_discoverable = changed.should_be_visible_in_directory();

        let writes = vec![
            WriteItem::delete(&tables.phone_numbers, account.number.as_str()),
            WriteItem::put(
                &tables.phone_numbers,
                constraint_item(ATTR_ACCOUNT_E164, AttributeValue::from(number), account.uuid),
            )
            .with_condition(Condition::not_exists(ATTR_ACCOUNT_E164)),
            WriteItem::delete(
                &tables.phone_number_identifiers,
                account.phone_number_identifier,
            ),
            WriteItem::put(
                &tables.phone_number_identifiers,
                constraint_item(
                    ATTR_PNI,
                    AttributeValue::from_uuid(phone_number_identifier),
                    account.uuid,
                ),
            )
            .with_condition(Condition::not_exists(ATTR_PNI)),
            WriteItem::update(
                &tables.accounts,
                account.uuid,
                vec![
                    UpdateAction::Set(
                        ATTR_ACCOUNT_DATA.into(),
                        encode_payload(self.codec.as_ref(), &changed)?,
                    ),
                    UpdateAction::Set(ATTR_ACCOUNT_E164.into(), AttributeValue::from(number)),
                    UpdateAction::Set(
                        ATTR_PNI.into(),
                        AttributeValue::from_uuid(phone_number_identifier),
                    ),
                    UpdateAction::Set(
                        ATTR_CANONICALLY_DISCOVERABLE.into(),
                        changed.canonically_discoverable.into(),
                    ),
                    UpdateAction::Add(ATTR_VERSION.into(), 1),
                ],
            )
            .with_condition(versioned_row(account.version)),
        ];

        match self.store.transact_write_items(writes) {
            Ok(()) => {
                changed.version = account.version + 1;
                Ok(changed)
            }
            Err(err) => {
                let cancelled = CancelledTransaction::from_store_error(
                    AccountsOperation::ChangeNumber.as_str(),
                    err,
                )?;
                if cancelled.condition_failed(CHANGE_NUMBER_ACCOUNT_ROW) || cancelled.has_conflict()
                {
                    Err(cancelled.contested(account.uuid))
                } else {
                    Err(cancelled.unexpected())
                }
            }
        }
    }

    fn set_username_inner(&self, account: &Account, username: &str) -> Result<Account, AccountsError> {
        let tables = &self.config.tables;
        let mut renamed = account.clone();
        renamed.username = Some(username.to_string());
        renamed.canonically_discoverable = renamed.should_be_visible_in_directory();

        let mut writes = vec![
            WriteItem::put(
                &tables.usernames,
                constraint_item(ATTR_USERNAME, AttributeValue::from(username), account.uuid),
            )
            .with_condition(Condition::not_exists(ATTR_USERNAME))
            .returning_old_on_failure(),
            WriteItem::update(
                &tables.accounts,
                account.uuid,
                vec![
                    UpdateAction::Set(
                        ATTR_ACCOUNT_DATA.into(),
                        encode_payload(self.codec.as_ref(), &renamed)?,
                    ),
                    UpdateAction::Set(ATTR_USERNAME.into(), AttributeValue::from(username)),
                    UpdateAction::Set(
                        ATTR_CANONICALLY_DISCOVERABLE.into(),
                        renamed.canonically_discoverable.into(),
                    ),
                    UpdateAction::Add(ATTR_VERSION.into(), 1),
                ],
            )
            .with_condition(versioned_row(account.version)),
        ];
        if let Some(previous) = account.username.as_deref().filter(|p| *p != username) {
            writes.push(WriteItem::delete(&tables.usernames, previous));
        }

        match self.store.transact_write_items(writes) {
            Ok(()) => {
                renamed.version = account.version + 1;
                Ok(renamed)
            }
            Err(err) => {
                let cancelled = CancelledTransaction::from_store_error(
                    AccountsOperation::SetUsername.as_str(),
                    err,
                )?;
                if cancelled.condition_failed(SET_USERNAME_INDEX) {
                    debug!(account = %account.uuid, username, "username already reserved");
                    Err(AccountsError::UsernameUnavailable {
                        username: username.to_string(),
                    })
                } else if cancelled.condition_failed(SET_USERNAME_ACCOUNT_ROW)
                    || cancelled.has_conflict()
                {
                    Err(cancelled.contested(account.uuid))
                } else {
                    Err(cancelled.unexpected())
                }
            }
        }
    }

    fn clear_username_inner(&self, account: &Account) -> Result<Account, AccountsError> {
        let Some(previous) = account.username.as_deref() else {
            return Ok(account.clone());
        };
        let tables = &self.config.tables;
        let mut cleared = account.clone();
        cleared.username = None;
        cleared.canonically_discoverable = cleared.should_be_visible_in_directory();

        let writes = vec![
            WriteItem::update(
                &tables.accounts,
                account.uuid,
                vec![
                    UpdateAction::Set(
                        ATTR_ACCOUNT_DATA.into(),
                        encode_payload(self.codec.as_ref(), &cleared)?,
                    ),
                    UpdateAction::Set(
                        ATTR_CANONICALLY_DISCOVERABLE.into(),
                        cleared.canonically_discoverable.into(),
                    ),
                    UpdateAction::Remove(ATTR_USERNAME.into()),
                    UpdateAction::Add(ATTR_VERSION.into(), 1),
                ],
            )
            .with_condition(versioned_row(account.version)),
            WriteItem::delete(&tables.usernames, previous),
        ];

        match self.store.transact_write_items(writes) {
            Ok(()) => {
                cleared.version = account.version + 1;
                Ok(cleared)
            }
            Err(err) => {
                let cancelled = CancelledTransaction::from_store_error(
                    AccountsOperation::ClearUsername.as_str(),
                    err,
                )?;
                if cancelled.condition_failed(CLEAR_USERNAME_ACCOUNT_ROW) || cancelled.has_conflict()
                {
                    Err(cancelled.contested(account.uuid))
                } else {
                    Err(cancelled.unexpected())
                }
            }
        }
    }

    fn update_inner(&self, account: &Account) -> Result<Account, AccountsError> {
        let mut updated = account.clone();
        updated.canonically_discoverable = account.should_be_visible_in_directory();
        let request = UpdateItemRequest {
            table: self.config.tables.accounts.clone(),
            key: AttributeValue::from_uuid(account.uuid),
            actions: vec![
                UpdateAction::Set(
                    ATTR_ACCOUNT_DATA.into(),
                    encode_payload(self.codec.as_ref(), account)?,
                ),
                UpdateAction::Set(
                    ATTR_CANONICALLY_DISCOVERABLE.into(),
                    updated.canonically_discoverable.into(),
                ),
                UpdateAction::Add(ATTR_VERSION.into(), 1),
            ],
            condition: Some(versioned_row(account.version)),
        };

        match self.store.update_item(request) {
            Ok(item) => {
                updated.version = item
                    .get_i64(ATTR_VERSION)
                    .unwrap_or(account.version + 1);
                Ok(updated)
            }
            Err(StoreError::TransactionConflict { .. }) => {
                debug!(account = %account.uuid, "update raced an in-flight writer");
                Err(AccountsError::ContestedLock {
                    account_id: account.uuid,
                })
            }
            Err(err @ StoreError::ConditionalCheckFailed { .. }) => {
                // Approximate: the row can be created or removed between the
                // failed update and this read.
                if self.account_row(account.uuid)?.is_some() {
                    debug!(
                        account = %account.uuid,
                        version = account.version,
                        "update lost a version race"
                    );
                    Err(AccountsError::ContestedLock {
                        account_id: account.uuid,
                    })
                } else {
                    Err(AccountsError::Store(err))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_inner(&self, uuid: Uuid) -> Result<(), AccountsError> {
        let Some(account) = self.read_account(uuid)? else {
            return Ok(());
        };
        let tables = &self.config.tables;
        let mut writes = vec![
            WriteItem::delete(&tables.phone_numbers, account.number.as_str()),
            WriteItem::delete(
                &tables.phone_number_identifiers,
                account.phone_number_identifier,
            ),
        ];
        if let Some(username) = account.username.as_deref() {
            writes.push(WriteItem::delete(&tables.usernames, username));
        }
        writes.push(WriteItem::delete(&tables.accounts, uuid));

        self.store.transact_write_items(writes).or_else(|err| {
            let cancelled =
                CancelledTransaction::from_store_error(AccountsOperation::Delete.as_str(), err)?;
            if cancelled.has_conflict() {
                Err(cancelled.contested(uuid))
            } else {
                Err(cancelled.unexpected())
            }
        })
    }

    /// Index hop reads eventually consistent; the row hop is consistent so an
    /// entry created in the same transaction as its row always resolves.
    fn get_by_index(
        &self,
        table: &str,
        key: AttributeValue,
    ) -> Result<Option<Account>, AccountsError> {
        let Some(entry) = self.store.get_item(GetItemRequest::new(table, key))? else {
            return Ok(None);
        };
        let owner = entry
            .get_uuid(KEY_ACCOUNT_UUID)
            .ok_or(AccountsError::CorruptRecord {
                attribute: KEY_ACCOUNT_UUID,
            })?;
        self.read_account(owner)
    }

    fn read_account(&self, uuid: Uuid) -> Result<Option<Account>, AccountsError> {
        self.account_row(uuid)?
            .map(|item| account_from_item(self.codec.as_ref(), &item))
            .transpose()
    }

    fn account_row(&self, uuid: Uuid) -> Result<Option<Item>, AccountsError> {
        Ok(self.store.get_item(
            GetItemRequest::new(&self.config.tables.accounts, uuid).consistent(),
        )?)
    }

    fn crawl(
        &self,
        start_after: Option<Uuid>,
        max_count: usize,
    ) -> Result<AccountCrawlChunk, AccountsError> {
        crawl_chunk(
            self.store.as_ref(),
            self.codec.as_ref(),
            CrawlRequest {
                table: &self.config.tables.accounts,
                page_size: self.config.scan_page_size,
                start_after,
                max_count,
            },
        )
    }
}

/// The row exists and still carries the version the caller read.
fn versioned_row(version: i64) -> Condition {
    Condition::exists(ATTR_ACCOUNT_E164).and(Condition::equals(ATTR_VERSION, version))
}
