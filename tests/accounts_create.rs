use acctdb::accounts::model::{AccountProfile, Device, PRIMARY_DEVICE_ID};
use acctdb::accounts::schema::{ATTR_USERNAME, ATTR_VERSION, KEY_ACCOUNT_UUID};
use acctdb::commit::tx::WriteItem;
use acctdb::storage::GetItemRequest;
use acctdb::storage::types::Item;
use acctdb::telemetry::{AccountsMetrics, AccountsOperation};
use acctdb::{
    Account, Accounts, AccountsConfig, AccountsError, AccountsErrorCode, CreateOutcome,
    KeyValueStore, MemoryStore, MemoryStoreConfig,
};
use std::sync::Arc;
use uuid::Uuid;

fn setup() -> (Arc<MemoryStore>, Accounts) {
    let config = AccountsConfig::default();
    let store = Arc::new(MemoryStore::with_tables(
        MemoryStoreConfig::default(),
        &config.table_definitions(),
    ));
    let accounts = Accounts::new(store.clone(), config).expect("accounts");
    (store, accounts)
}

fn profile(identity_key: u8) -> AccountProfile {
    AccountProfile {
        devices: vec![Device {
            id: PRIMARY_DEVICE_ID,
            enabled: true,
            ..Device::default()
        }],
        discoverable_by_phone_number: true,
        identity_key: Some(vec![identity_key; 4]),
        ..AccountProfile::default()
    }
}

fn candidate(number: &str) -> Account {
    Account::new(Uuid::new_v4(), number, Uuid::new_v4()).with_profile(profile(1))
}

fn stored_row(store: &MemoryStore, uuid: Uuid) -> Item {
    store
        .get_item(GetItemRequest::new("accounts", uuid).consistent())
        .expect("get")
        .expect("row present")
}

#[test]
fn create_writes_row_and_both_indexes() {
    let (store, accounts) = setup();
    let account = candidate("+14155550100");

    let outcome = accounts.create(&account).expect("create");
    assert!(outcome.created());
    assert!(outcome.account().canonically_discoverable);

    assert_eq!(store.item_count("accounts"), 1);
    assert_eq!(store.item_count("accounts_phone_numbers"), 1);
    assert_eq!(store.item_count("accounts_phone_number_identifiers"), 1);
    assert_eq!(stored_row(&store, account.uuid).get_i64(ATTR_VERSION), Some(0));

    let by_number = accounts
        .get_by_phone_number("+14155550100")
        .expect("lookup")
        .expect("found");
    assert_eq!(by_number.uuid, account.uuid);
    assert_eq!(by_number.profile, account.profile);
}

#[test]
fn repeated_create_merges_onto_the_original() {
    let (store, accounts) = setup();
    let first = candidate("+14155550101");
    assert!(accounts.create(&first).expect("first create").created());

    let mut second = first.clone();
    second.profile = profile(9);
    let outcome = accounts.create(&second).expect("second create");
    let CreateOutcome::Merged(merged) = outcome else {
        panic!("expected merge, got {outcome:?}");
    };
    assert_eq!(merged.uuid, first.uuid);
    assert_eq!(merged.version, 1);

    let stored = accounts
        .get_by_account_identifier(first.uuid)
        .expect("get")
        .expect("present");
    assert_eq!(stored.profile, profile(9));
    assert_eq!(stored.version, 1);
    assert_eq!(store.item_count("accounts"), 1);
}

#[test]
fn create_with_taken_number_adopts_the_existing_identifier() {
    let (store, accounts) = setup();
    let existing = candidate("+14155550102");
    accounts.create(&existing).expect("create");
    let existing = accounts
        .set_username(&existing, "owner.01")
        .expect("set username");

    let mut reregistration = candidate("+14155550102");
    reregistration.profile = profile(7);
    let outcome = accounts.create(&reregistration).expect("create");
    assert!(!outcome.created());

    let merged = outcome.into_account();
    assert_eq!(merged.uuid, existing.uuid);
    assert_eq!(merged.phone_number_identifier, existing.phone_number_identifier);
    assert_eq!(merged.username.as_deref(), Some("owner.01"));
    assert_eq!(merged.version, existing.version + 1);

    assert_eq!(store.item_count("accounts"), 1);
    assert!(
        accounts
            .get_by_account_identifier(reregistration.uuid)
            .expect("get")
            .is_none()
    );
    let stored = accounts
        .get_by_username("owner.01")
        .expect("get")
        .expect("present");
    assert_eq!(stored.profile, profile(7));
}

#[test]
fn create_with_taken_phone_number_identifier_merges_too() {
    let (_store, accounts) = setup();
    let existing = candidate("+14155550103");
    accounts.create(&existing).expect("create");

    let mut collider = candidate("+14155550999");
    collider.phone_number_identifier = existing.phone_number_identifier;
    let merged = accounts.create(&collider).expect("create").into_account();
    assert_eq!(merged.uuid, existing.uuid);
    assert_eq!(merged.number, "+14155550103");
    assert!(
        accounts
            .get_by_phone_number("+14155550999")
            .expect("get")
            .is_none()
    );
}

#[test]
fn identifier_bound_to_another_number_is_a_conflict() {
    let (store, accounts) = setup();
    let existing = candidate("+14155550104");
    accounts.create(&existing).expect("create");

    let mut misuse = existing.clone();
    misuse.number = "+14155550888".into();
    misuse.phone_number_identifier = Uuid::new_v4();
    let err = accounts.create(&misuse).expect_err("conflict");
    assert!(matches!(
        err,
        AccountsError::IdentifierConflict { account_id } if account_id == existing.uuid
    ));
    assert!(!err.is_recoverable());
    assert_eq!(store.item_count("accounts_phone_numbers"), 1);
}

#[test]
fn create_does_not_claim_a_username_carried_by_the_candidate() {
    let (store, accounts) = setup();
    let mut first = candidate("+14155550109");
    first.username = Some("alice".into());

    let created = accounts.create(&first).expect("create").into_account();
    assert_eq!(created.username, None);
    assert_eq!(store.item_count("accounts_usernames"), 0);
    assert_eq!(stored_row(&store, first.uuid).get_str(ATTR_USERNAME), None);
    let stored = accounts
        .get_by_account_identifier(first.uuid)
        .expect("get")
        .expect("present");
    assert_eq!(stored.username, None);

    let second = accounts
        .create(&candidate("+14155550110"))
        .expect("create")
        .into_account();
    let second = accounts
        .set_username(&second, "alice")
        .expect("name is free");

    accounts.delete(first.uuid).expect("delete");
    let owner = accounts
        .get_by_username("alice")
        .expect("get")
        .expect("still reserved");
    assert_eq!(owner.uuid, second.uuid);
    assert_eq!(owner.username.as_deref(), Some("alice"));
}

#[test]
fn create_rejects_a_candidate_past_its_initial_version() {
    let (store, accounts) = setup();
    let mut stale = candidate("+14155550111");
    stale.version = 3;

    let err = accounts.create(&stale).expect_err("invalid");
    assert_eq!(err.code(), AccountsErrorCode::InvalidCandidate);
    assert!(!err.is_recoverable());
    assert_eq!(store.item_count("accounts"), 0);
    assert_eq!(store.item_count("accounts_phone_numbers"), 0);
}

#[test]
fn create_racing_an_in_flight_writer_is_contested() {
    let (store, accounts) = setup();
    let account = candidate("+14155550105");

    let guard = store
        .lock_item("accounts", account.uuid)
        .expect("hold row");
    let err = accounts.create(&account).expect_err("contested");
    assert!(matches!(err, AccountsError::ContestedLock { .. }));
    assert!(err.is_recoverable());
    assert_eq!(store.item_count("accounts"), 0);

    drop(guard);
    assert!(accounts.create(&account).expect("retry").created());
}

#[test]
fn dangling_index_entry_is_reported_during_merge() {
    let (store, accounts) = setup();
    let ghost = Uuid::new_v4();
    store
        .transact_write_items(vec![WriteItem::put(
            "accounts_phone_numbers",
            Item::new()
                .with("P", "+14155550106")
                .with(KEY_ACCOUNT_UUID, ghost),
        )])
        .expect("seed dangling entry");

    let err = accounts
        .create(&candidate("+14155550106"))
        .expect_err("dangling");
    assert!(matches!(
        err,
        AccountsError::DanglingConstraint { owner, .. } if owner == ghost
    ));
}

#[test]
fn create_outcomes_reach_the_telemetry_hook() {
    let config = AccountsConfig::default();
    let store = Arc::new(MemoryStore::with_tables(
        MemoryStoreConfig::default(),
        &config.table_definitions(),
    ));
    let metrics = Arc::new(AccountsMetrics::default());
    let accounts = Accounts::new(store.clone(), config)
        .expect("accounts")
        .with_telemetry(metrics.clone());

    let account = candidate("+14155550107");
    accounts.create(&account).expect("create");
    let _held = store.lock_item("accounts", account.uuid).expect("hold");
    let other = Account::new(account.uuid, "+14155550108", Uuid::new_v4());
    accounts.create(&other).expect_err("contested");

    let create = metrics.snapshot(AccountsOperation::Create);
    assert_eq!(create.calls, 2);
    assert_eq!(create.errors, 1);
    assert_eq!(create.contested_locks, 1);
}
