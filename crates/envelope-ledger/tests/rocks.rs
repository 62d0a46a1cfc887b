//! End-to-end tests against the RocksDB backend.

#![cfg(feature = "rocksdb-backend")]

mod common;

use common::{date, init_tracing};
use envelope_core::{NewAccount, Posting, StartingBalance, SubscriptionId, UserId};
use envelope_ledger::{Ledger, LedgerConfig};
use tempfile::TempDir;

fn config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig {
        data_dir: Some(dir.path().to_string_lossy().to_string()),
        ..LedgerConfig::default()
    }
}

#[test]
fn ledger_survives_reopen() {
    init_tracing();
    let dir = TempDir::new().expect("Failed to create temp directory");
    let user = UserId::generate();

    let account_id = {
        let ledger = Ledger::open(config(&dir)).unwrap();
        let account = ledger
            .create_account(
                NewAccount::new(SubscriptionId::generate(), user)
                    .with_starting_balance(StartingBalance::new(10_000, date(2024, 1, 1))),
            )
            .unwrap();
        let aside = ledger.buckets(&account).for_role("aside", user).unwrap();
        ledger
            .recorder()
            .post_transaction(&account, date(2024, 1, 2), "Savings", user, &[Posting::deposit(aside.id, 1_000)])
            .unwrap();
        account.id
    };

    let ledger = Ledger::open(config(&dir)).unwrap();
    let account = ledger.account(&account_id).unwrap();
    let summary = ledger.balances().summary(&account).unwrap();
    assert_eq!(summary.balance_cents, 11_000);
    assert_eq!(summary.unavailable_cents, 1_000);
    assert_eq!(summary.available_cents, 10_000);

    let page = ledger.pager().page_default(&account, 0).unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].event.actor, "Savings");
}

#[test]
fn open_requires_data_dir() {
    assert!(Ledger::open(LedgerConfig::default()).is_err());
}
