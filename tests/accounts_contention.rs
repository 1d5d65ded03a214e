use acctdb::{Account, Accounts, AccountsConfig, AccountsError, MemoryStore, MemoryStoreConfig};
use std::sync::Arc;
use std::sync::Barrier;
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

/// Many registrations for one phone number with distinct identifiers race;
/// exactly one creates, the rest merge onto it or are told to retry.
#[test]
fn concurrent_creates_for_one_number_produce_a_single_account() {
    const RACERS: usize = 8;
    let (store, accounts) = setup();
    let barrier = Barrier::new(RACERS);

    let outcomes: Vec<Result<(bool, Uuid), AccountsError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let barrier = &barrier;
                let accounts = &accounts;
                scope.spawn(move || {
                    let candidate = Account::new(Uuid::new_v4(), "+14155550400", Uuid::new_v4());
                    barrier.wait();
                    accounts
                        .create(&candidate)
                        .map(|outcome| (outcome.created(), outcome.account().uuid))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("racer panicked"))
            .collect()
    });

    let winners: Vec<Uuid> = outcomes
        .iter()
        .filter_map(|r| match r {
            Ok((true, uuid)) => Some(*uuid),
            _ => None,
        })
        .collect();
    assert_eq!(winners.len(), 1, "outcomes: {outcomes:?}");
    let winner = winners[0];

    for outcome in &outcomes {
        match outcome {
            Ok((_, uuid)) => assert_eq!(*uuid, winner),
            Err(err) => assert!(
                matches!(err, AccountsError::ContestedLock { .. }),
                "unexpected error: {err}"
            ),
        }
    }
    assert_eq!(store.item_count("accounts"), 1);
    assert_eq!(store.item_count("accounts_phone_numbers"), 1);
    let owner = accounts
        .get_by_phone_number("+14155550400")
        .expect("get")
        .expect("present");
    assert_eq!(owner.uuid, winner);
}

/// Writers updating the same account from the same starting version: each
/// version is won by at most one of them and no update is silently lost.
#[test]
fn concurrent_updates_from_one_version_never_both_succeed() {
    const WRITERS: usize = 6;
    let (_store, accounts) = setup();
    let account = Account::new(Uuid::new_v4(), "+14155550401", Uuid::new_v4());
    let account = accounts.create(&account).expect("create").into_account();
    let barrier = Barrier::new(WRITERS);

    let results: Vec<Result<Account, AccountsError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let mut edited = account.clone();
                edited.profile.registration_lock = Some(format!("writer-{i}"));
                let barrier = &barrier;
                let accounts = &accounts;
                scope.spawn(move || {
                    barrier.wait();
                    accounts.update(&edited)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("writer panicked"))
            .collect()
    });

    let successes: Vec<&Account> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(successes.len(), 1, "results: {results:?}");
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AccountsError::ContestedLock { .. }))
    );

    let stored = accounts
        .get_by_account_identifier(account.uuid)
        .expect("get")
        .expect("present");
    assert_eq!(stored.version, 1);
    assert_eq!(
        stored.profile.registration_lock,
        successes[0].profile.registration_lock
    );
}

/// Contested writers that re-read and retry all land eventually.
#[test]
fn retrying_contested_updates_converges() {
    const WRITERS: usize = 4;
    const ROUNDS: usize = 5;
    let (_store, accounts) = setup();
    let account = Account::new(Uuid::new_v4(), "+14155550402", Uuid::new_v4());
    let uuid = accounts.create(&account).expect("create").into_account().uuid;

    std::thread::scope(|scope| {
        for _ in 0..WRITERS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    loop {
                        let current = accounts
                            .get_by_account_identifier(uuid)
                            .expect("get")
                            .expect("present");
                        match accounts.update(&current) {
                            Ok(_) => break,
                            Err(err) if err.is_recoverable() => std::thread::yield_now(),
                            Err(err) => panic!("update failed: {err}"),
                        }
                    }
                }
            });
        }
    });

    let stored = accounts
        .get_by_account_identifier(uuid)
        .expect("get")
        .expect("present");
    assert_eq!(stored.version, (WRITERS * ROUNDS) as i64);
}
