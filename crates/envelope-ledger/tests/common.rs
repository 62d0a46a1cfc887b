//! Common test utilities for envelope-ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

use envelope_core::{Account, NewAccount, StartingBalance, SubscriptionId, UserId};
use envelope_ledger::{Ledger, LedgerConfig};
use envelope_store::{MemoryStore, Store};

/// Test harness: a ledger over an in-memory store the test can also reach.
pub struct TestHarness {
    /// The store behind the ledger, for fault injection.
    pub store: Arc<MemoryStore>,
    /// The ledger under test.
    pub ledger: Ledger,
    /// The user acting in the test.
    pub user_id: UserId,
}

impl TestHarness {
    /// Create a harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: LedgerConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(Arc::clone(&store) as Arc<dyn Store>, config);
        Self {
            store,
            ledger,
            user_id: UserId::generate(),
        }
    }

    /// Open an account without a starting balance.
    pub fn open_account(&self) -> Account {
        self.ledger
            .create_account(NewAccount::new(SubscriptionId::generate(), self.user_id))
            .expect("Failed to create account")
    }

    /// Open an account seeded with `amount_cents` on 2024-01-01.
    pub fn open_account_with(&self, amount_cents: i64) -> Account {
        self.ledger
            .create_account(
                NewAccount::new(SubscriptionId::generate(), self.user_id)
                    .with_starting_balance(StartingBalance::new(amount_cents, date(2024, 1, 1))),
            )
            .expect("Failed to create account")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Route ledger logs to the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
