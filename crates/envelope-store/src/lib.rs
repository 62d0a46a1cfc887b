//! Storage layer for the envelope ledger.
//!
//! This crate defines the persistence contract the ledger engine runs against
//! and ships two implementations:
//!
//! - [`MemoryStore`]: lock-guarded tables, for tests and embedding
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with column families
//!   for the secondary indexes
//!
//! # Atomicity
//!
//! Every write method is all-or-nothing. `insert_event` and `create_account`
//! commit several rows at once; a failure leaves none of them visible.
//!
//! # Example
//!
//! ```
//! use envelope_core::{Account, BucketRecord, BucketRole, SubscriptionId, UserId};
//! use envelope_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let author = UserId::generate();
//! let account = Account::new(SubscriptionId::generate(), author);
//! let general = BucketRecord::new(account.id, "General", BucketRole::Default, author);
//!
//! store.create_account(&account, &general, None).unwrap();
//! assert_eq!(store.list_buckets(&account.id).unwrap().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use envelope_core::{
    Account, AccountId, AccountItem, BucketId, BucketRecord, BucketRole, EventBatch, LineItem,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create an account, its default bucket and, optionally, the event that
    /// seeds its starting balance, in one atomic write.
    ///
    /// # Errors
    ///
    /// - `StoreError::BucketMismatch` if the bucket or opening postings target another account.
    /// - `StoreError::Database` if the write fails; nothing is persisted.
    fn create_account(
        &self,
        account: &Account,
        default_bucket: &BucketRecord,
        opening: Option<&EventBatch>,
    ) -> Result<()>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    // =========================================================================
    // Bucket Operations
    // =========================================================================

    /// Insert a bucket.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::DuplicateRole` if the bucket has a reserved role the account already holds.
    fn insert_bucket(&self, bucket: &BucketRecord) -> Result<()>;

    /// Get a bucket by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_bucket(&self, bucket_id: &BucketId) -> Result<Option<BucketRecord>>;

    /// Find the first bucket of an account with the given role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_bucket_by_role(
        &self,
        account_id: &AccountId,
        role: &BucketRole,
    ) -> Result<Option<BucketRecord>>;

    /// List an account's buckets in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_buckets(&self, account_id: &AccountId) -> Result<Vec<BucketRecord>>;

    /// List an account's most recently updated buckets, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn recent_buckets(&self, account_id: &AccountId, limit: usize) -> Result<Vec<BucketRecord>>;

    // =========================================================================
    // Event Operations
    // =========================================================================

    /// Insert an event with all of its line items atomically, touching the
    /// `updated_at` of every bucket posted to.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account or a bucket doesn't exist.
    /// - `StoreError::BucketMismatch` if a line item targets another account's bucket.
    /// - `StoreError::Database` if the write fails; nothing is persisted.
    fn insert_event(&self, batch: &EventBatch) -> Result<()>;

    /// List every line item posted to an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_line_items_by_account(&self, account_id: &AccountId) -> Result<Vec<LineItem>>;

    /// List every line item posted to a bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_line_items_by_bucket(&self, bucket_id: &BucketId) -> Result<Vec<LineItem>>;

    /// List an account's events with their line items, ordered by
    /// `occurred_on` (newest first, ties broken by newest event).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_account_items(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AccountItem>>;
}

/// Check the structural rules of an event batch before it is written.
///
/// `bucket_owner` resolves a bucket to its owning account.
pub(crate) fn validate_batch<F>(batch: &EventBatch, mut bucket_owner: F) -> Result<()>
where
    F: FnMut(&BucketId) -> Result<Option<AccountId>>,
{
    let account_id = batch.event.account_id;

    for item in &batch.line_items {
        if item.event_id != batch.event.id {
            return Err(StoreError::Database(format!(
                "line item {} belongs to event {}, not {}",
                item.id, item.event_id, batch.event.id
            )));
        }

        let owner = bucket_owner(&item.bucket_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "bucket",
            id: item.bucket_id.to_string(),
        })?;

        if item.account_id != account_id || owner != account_id {
            return Err(StoreError::BucketMismatch {
                bucket_id: item.bucket_id.to_string(),
                account_id: account_id.to_string(),
            });
        }
    }

    Ok(())
}
