//! In-memory storage implementation.
//!
//! Tables live behind a single `RwLock`. Writes are staged row by row while
//! holding the write lock and only applied once every row is staged, so a
//! failed write leaves the tables untouched.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use envelope_core::{
    Account, AccountId, AccountItem, BucketId, BucketRecord, BucketRole, Event, EventBatch,
    EventId, LineItem,
};

use crate::error::{Result, StoreError};
use crate::{validate_batch, Store};

/// One row of a staged write.
#[derive(Debug)]
enum Row {
    Account(Account),
    Bucket(BucketRecord),
    Event(Event),
    LineItem(LineItem),
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    buckets: HashMap<BucketId, BucketRecord>,
    /// Bucket ids per account, in creation order.
    buckets_by_account: HashMap<AccountId, Vec<BucketId>>,
    /// Unique index over reserved roles.
    reserved_roles: HashMap<(AccountId, BucketRole), BucketId>,
    /// Monotonic touch counter per bucket; orders buckets touched within the same instant.
    bucket_touches: HashMap<BucketId, u64>,
    events: HashMap<EventId, Event>,
    events_by_account: HashMap<AccountId, Vec<EventId>>,
    line_items_by_event: HashMap<EventId, Vec<LineItem>>,
    sequence: u64,
}

impl Tables {
    fn bucket_owner(&self, bucket_id: &BucketId) -> Option<AccountId> {
        self.buckets.get(bucket_id).map(|bucket| bucket.account_id)
    }

    fn check_role_free(&self, bucket: &BucketRecord) -> Result<()> {
        if bucket.role.is_reserved()
            && self
                .reserved_roles
                .contains_key(&(bucket.account_id, bucket.role.clone()))
        {
            return Err(StoreError::DuplicateRole {
                account_id: bucket.account_id.to_string(),
                role: bucket.role.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, bucket_id: BucketId) {
        self.sequence += 1;
        self.bucket_touches.insert(bucket_id, self.sequence);
    }

    fn apply(&mut self, rows: Vec<Row>) {
        let now = Utc::now();

        for row in rows {
            match row {
                Row::Account(account) => {
                    self.accounts.insert(account.id, account);
                }
                Row::Bucket(bucket) => {
                    if bucket.role.is_reserved() {
                        self.reserved_roles
                            .insert((bucket.account_id, bucket.role.clone()), bucket.id);
                    }
                    self.buckets_by_account
                        .entry(bucket.account_id)
                        .or_default()
                        .push(bucket.id);
                    self.touch(bucket.id);
                    self.buckets.insert(bucket.id, bucket);
                }
                Row::Event(event) => {
                    self.events_by_account
                        .entry(event.account_id)
                        .or_default()
                        .push(event.id);
                    self.line_items_by_event.entry(event.id).or_default();
                    self.events.insert(event.id, event);
                }
                Row::LineItem(item) => {
                    if let Some(bucket) = self.buckets.get_mut(&item.bucket_id) {
                        bucket.updated_at = now;
                    }
                    self.touch(item.bucket_id);
                    self.line_items_by_event
                        .entry(item.event_id)
                        .or_default()
                        .push(item);
                }
            }
        }
    }
}

/// Rows collected for a single atomic write.
struct Staging {
    rows: Vec<Row>,
    fail_after: Option<usize>,
}

impl Staging {
    fn push(&mut self, row: Row) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.rows.len() >= limit {
                return Err(StoreError::Database(format!(
                    "simulated storage fault after {limit} rows"
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    fn push_batch(&mut self, batch: &EventBatch) -> Result<()> {
        self.push(Row::Event(batch.event.clone()))?;
        for item in &batch.line_items {
            self.push(Row::LineItem(item.clone()))?;
        }
        Ok(())
    }
}

/// In-memory implementation of [`Store`].
///
/// Intended for tests and embedding. Not optimized for large ledgers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fault: Mutex<Option<usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail after staging `rows` rows.
    ///
    /// The failure happens part-way through the write; nothing it staged
    /// becomes visible. The fault fires once.
    ///
    /// # Errors
    ///
    /// Returns an error if the fault lock is poisoned.
    pub fn fail_next_write_after(&self, rows: usize) -> Result<()> {
        *self
            .fault
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".into()))? = Some(rows);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }

    fn staging(&self) -> Result<Staging> {
        let fail_after = self
            .fault
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".into()))?
            .take();
        Ok(Staging {
            rows: Vec::new(),
            fail_after,
        })
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(
        &self,
        account: &Account,
        default_bucket: &BucketRecord,
        opening: Option<&EventBatch>,
    ) -> Result<()> {
        if default_bucket.account_id != account.id {
            return Err(StoreError::BucketMismatch {
                bucket_id: default_bucket.id.to_string(),
                account_id: account.id.to_string(),
            });
        }
        if default_bucket.role != BucketRole::Default {
            return Err(StoreError::Database(format!(
                "bucket {} is not a default bucket",
                default_bucket.id
            )));
        }

        let mut tables = self.write()?;
        if tables.accounts.contains_key(&account.id) {
            return Err(StoreError::Database(format!(
                "account already exists: {}",
                account.id
            )));
        }

        if let Some(batch) = opening {
            if batch.event.account_id != account.id {
                return Err(StoreError::BucketMismatch {
                    bucket_id: default_bucket.id.to_string(),
                    account_id: account.id.to_string(),
                });
            }
            validate_batch(batch, |bucket_id| {
                if *bucket_id == default_bucket.id {
                    Ok(Some(account.id))
                } else {
                    Ok(tables.bucket_owner(bucket_id))
                }
            })?;
        }

        let mut staging = self.staging()?;
        staging.push(Row::Account(account.clone()))?;
        staging.push(Row::Bucket(default_bucket.clone()))?;
        if let Some(batch) = opening {
            staging.push_batch(batch)?;
        }

        tables.apply(staging.rows);
        Ok(())
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    // =========================================================================
    // Bucket Operations
    // =========================================================================

    fn insert_bucket(&self, bucket: &BucketRecord) -> Result<()> {
        let mut tables = self.write()?;

        if !tables.accounts.contains_key(&bucket.account_id) {
            return Err(StoreError::NotFound {
                entity: "account",
                id: bucket.account_id.to_string(),
            });
        }
        tables.check_role_free(bucket)?;

        let mut staging = self.staging()?;
        staging.push(Row::Bucket(bucket.clone()))?;

        tables.apply(staging.rows);
        Ok(())
    }

    fn get_bucket(&self, bucket_id: &BucketId) -> Result<Option<BucketRecord>> {
        Ok(self.read()?.buckets.get(bucket_id).cloned())
    }

    fn find_bucket_by_role(
        &self,
        account_id: &AccountId,
        role: &BucketRole,
    ) -> Result<Option<BucketRecord>> {
        let tables = self.read()?;
        let found = tables
            .buckets_by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.buckets.get(id))
            .find(|bucket| &bucket.role == role)
            .cloned();
        Ok(found)
    }

    fn list_buckets(&self, account_id: &AccountId) -> Result<Vec<BucketRecord>> {
        let tables = self.read()?;
        let buckets = tables
            .buckets_by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.buckets.get(id))
            .cloned()
            .collect();
        Ok(buckets)
    }

    fn recent_buckets(&self, account_id: &AccountId, limit: usize) -> Result<Vec<BucketRecord>> {
        let tables = self.read()?;
        let mut buckets: Vec<(&BucketRecord, u64)> = tables
            .buckets_by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.buckets.get(id))
            .map(|bucket| {
                let touched = tables.bucket_touches.get(&bucket.id).copied().unwrap_or(0);
                (bucket, touched)
            })
            .collect();

        buckets.sort_by(|(a, a_touch), (b, b_touch)| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b_touch.cmp(a_touch))
        });

        Ok(buckets
            .into_iter()
            .take(limit)
            .map(|(bucket, _)| bucket.clone())
            .collect())
    }

    // =========================================================================
    // Event Operations
    // =========================================================================

    fn insert_event(&self, batch: &EventBatch) -> Result<()> {
        let mut tables = self.write()?;

        if !tables.accounts.contains_key(&batch.event.account_id) {
            return Err(StoreError::NotFound {
                entity: "account",
                id: batch.event.account_id.to_string(),
            });
        }
        validate_batch(batch, |bucket_id| Ok(tables.bucket_owner(bucket_id)))?;

        let mut staging = self.staging()?;
        staging.push_batch(batch)?;

        tables.apply(staging.rows);
        Ok(())
    }

    fn list_line_items_by_account(&self, account_id: &AccountId) -> Result<Vec<LineItem>> {
        let tables = self.read()?;
        let items = tables
            .events_by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|event_id| tables.line_items_by_event.get(event_id))
            .flatten()
            .filter(|item| item.account_id == *account_id)
            .cloned()
            .collect();
        Ok(items)
    }

    fn list_line_items_by_bucket(&self, bucket_id: &BucketId) -> Result<Vec<LineItem>> {
        let tables = self.read()?;
        let Some(account_id) = tables.bucket_owner(bucket_id) else {
            return Ok(Vec::new());
        };
        let items = tables
            .events_by_account
            .get(&account_id)
            .into_iter()
            .flatten()
            .filter_map(|event_id| tables.line_items_by_event.get(event_id))
            .flatten()
            .filter(|item| item.bucket_id == *bucket_id)
            .cloned()
            .collect();
        Ok(items)
    }

    fn list_account_items(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AccountItem>> {
        let tables = self.read()?;
        let mut events: Vec<&Event> = tables
            .events_by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.events.get(id))
            .collect();

        events.sort_by(|a, b| {
            b.occurred_on
                .cmp(&a.occurred_on)
                .then_with(|| b.id.cmp(&a.id))
        });

        let items = events
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|event| AccountItem {
                event: event.clone(),
                line_items: tables
                    .line_items_by_event
                    .get(&event.id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        Ok(items)
    }
}
