//! Envelope budgeting ledger.
//!
//! An account's money is partitioned into buckets (envelopes). Every movement
//! of money is an [`Event`](envelope_core::Event) made of signed line items,
//! written atomically. Balances are derived from those line items:
//!
//! - **Buckets** ([`BucketManager`]): role lookup/creation, sorted and recent
//!   listings, display placeholders for missing reserved buckets
//! - **Balances** ([`BalanceEngine`]): account and bucket balances, the
//!   available/reserved split, memoized with explicit invalidation
//! - **Transactions** ([`TransactionRecorder`]): atomic event posting and
//!   starting-balance seeding
//! - **History** ([`LedgerPager`]): newest-first pages of events
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use envelope_core::{NewAccount, Posting, StartingBalance, SubscriptionId, UserId};
//! use envelope_ledger::Ledger;
//!
//! let ledger = Ledger::in_memory();
//! let user = UserId::generate();
//! let opened_on = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!
//! let account = ledger
//!     .create_account(
//!         NewAccount::new(SubscriptionId::generate(), user)
//!             .with_starting_balance(StartingBalance::new(10_000, opened_on)),
//!     )
//!     .unwrap();
//!
//! let aside = ledger.buckets(&account).for_role("aside", user).unwrap();
//! ledger
//!     .recorder()
//!     .post_transaction(&account, opened_on, "Savings", user, &[Posting::deposit(aside.id, 2_500)])
//!     .unwrap();
//!
//! assert_eq!(ledger.balances().account_balance(&account).unwrap(), 12_500);
//! assert_eq!(ledger.balances().available_balance(&account).unwrap(), 10_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounts;
pub mod balance;
pub mod buckets;
pub mod config;
pub mod pager;
pub mod recorder;

use std::sync::Arc;

use envelope_core::Account;
use envelope_store::{MemoryStore, Store};

pub use balance::{BalanceEngine, BalanceSnapshot, BalanceSummary, Reconciliation};
pub use buckets::BucketManager;
pub use config::{ConfigError, LedgerConfig};
pub use pager::{LedgerPager, Page};
pub use recorder::TransactionRecorder;

/// The ledger: a store, its balance cache and configuration.
///
/// Cheap accessors hand out the per-concern components; all of them share the
/// same store and balance cache, so a transaction posted through
/// [`recorder`](Self::recorder) is immediately reflected by
/// [`balances`](Self::balances).
pub struct Ledger {
    store: Arc<dyn Store>,
    balances: BalanceEngine,
    config: LedgerConfig,
}

impl Ledger {
    /// Create a ledger over an existing store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: LedgerConfig) -> Self {
        Self {
            balances: BalanceEngine::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// A ledger backed by a fresh [`MemoryStore`] with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), LedgerConfig::default())
    }

    /// Open a ledger backed by `RocksDB` at `config.data_dir`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if the configuration is invalid or
    ///   names no data directory.
    /// - `LedgerError::Persistence` if the database cannot be opened.
    #[cfg(feature = "rocksdb-backend")]
    pub fn open(config: LedgerConfig) -> envelope_core::Result<Self> {
        config
            .validate()
            .map_err(|e| envelope_core::LedgerError::InvalidArgument(e.to_string()))?;
        let data_dir = config.data_dir.clone().ok_or_else(|| {
            envelope_core::LedgerError::InvalidArgument("data_dir is not configured".into())
        })?;
        tracing::info!(path = %data_dir, "Opening RocksDB store");
        let store = envelope_store::RocksStore::open(&data_dir)?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Bucket operations for `account`.
    #[must_use]
    pub fn buckets<'a>(&'a self, account: &'a Account) -> BucketManager<'a> {
        BucketManager::new(self.store.as_ref(), account, &self.config)
    }

    /// The balance engine.
    #[must_use]
    pub const fn balances(&self) -> &BalanceEngine {
        &self.balances
    }

    /// The transaction recorder.
    #[must_use]
    pub fn recorder(&self) -> TransactionRecorder<'_> {
        TransactionRecorder::new(self.store.as_ref(), &self.balances)
    }

    /// The ledger pager.
    #[must_use]
    pub fn pager(&self) -> LedgerPager<'_> {
        LedgerPager::new(self.store.as_ref(), &self.config)
    }
}
