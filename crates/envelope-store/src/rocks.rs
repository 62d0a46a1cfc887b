//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Every multi-row write goes through a single `WriteBatch`. `RocksDB` has no
//! uniqueness constraints, so writes that check the reserved-role index run
//! under a store-wide write mutex.
//!
//! Every bucket write records a touch sequence next to the bucket. The
//! counter is read and advanced under the write mutex and saved in the same
//! batch, so `recent_buckets` breaks `updated_at` ties by write order.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use envelope_core::{
    Account, AccountId, AccountItem, BucketId, BucketRecord, BucketRole, Event, EventBatch,
    EventId, LineItem,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, TOUCH_SEQUENCE_KEY};
use crate::{validate_batch, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect every `(key, value)` pair whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn line_items_for_event(&self, event_id: &EventId) -> Result<Vec<LineItem>> {
        let prefix = keys::event_line_items_prefix(event_id);
        self.scan_prefix(cf::LINE_ITEMS, &prefix)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    /// Event ids of an account in ascending `(occurred_on, event_id)` order.
    fn account_event_ids(&self, account_id: &AccountId) -> Result<Vec<EventId>> {
        let prefix = keys::id_prefix(account_id.as_bytes());
        self.scan_prefix(cf::EVENTS_BY_ACCOUNT, &prefix)?
            .iter()
            .map(|(key, _)| {
                keys::extract_event_id(key)
                    .ok_or_else(|| StoreError::Database("malformed event index key".into()))
            })
            .collect()
    }

    fn decode_sequence(raw: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = raw
            .try_into()
            .map_err(|_| StoreError::Database("malformed touch sequence".into()))?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// The last touch sequence handed out. Call under the write lock.
    fn touch_sequence(&self) -> Result<u64> {
        let cf_meta = self.cf(cf::META)?;
        self.db
            .get_cf(&cf_meta, TOUCH_SEQUENCE_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map_or(Ok(0), |raw| Self::decode_sequence(&raw))
    }

    fn put_touch_sequence(&self, batch: &mut WriteBatch, sequence: u64) -> Result<()> {
        let cf_meta = self.cf(cf::META)?;
        batch.put_cf(&cf_meta, TOUCH_SEQUENCE_KEY, sequence.to_be_bytes());
        Ok(())
    }

    fn bucket_touch(&self, bucket_id: &BucketId) -> Result<u64> {
        let cf_touches = self.cf(cf::BUCKET_TOUCHES)?;
        self.db
            .get_cf(&cf_touches, keys::bucket_key(bucket_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map_or(Ok(0), |raw| Self::decode_sequence(&raw))
    }

    fn put_bucket(
        &self,
        batch: &mut WriteBatch,
        bucket: &BucketRecord,
        is_new: bool,
        sequence: &mut u64,
    ) -> Result<()> {
        let cf_buckets = self.cf(cf::BUCKETS)?;
        let cf_touches = self.cf(cf::BUCKET_TOUCHES)?;
        batch.put_cf(&cf_buckets, keys::bucket_key(&bucket.id), Self::serialize(bucket)?);

        *sequence += 1;
        batch.put_cf(&cf_touches, keys::bucket_key(&bucket.id), sequence.to_be_bytes());

        if is_new {
            let cf_by_account = self.cf(cf::BUCKETS_BY_ACCOUNT)?;
            batch.put_cf(
                &cf_by_account,
                keys::account_bucket_key(&bucket.account_id, bucket.created_at, &bucket.id),
                [],
            );
            if bucket.role.is_reserved() {
                let cf_roles = self.cf(cf::BUCKET_ROLES)?;
                batch.put_cf(
                    &cf_roles,
                    keys::bucket_role_key(&bucket.account_id, &bucket.role),
                    bucket.id.as_bytes(),
                );
            }
        }
        Ok(())
    }

    /// Stage an event, its line items and the touched buckets.
    ///
    /// `pending` holds buckets written in the same batch that are not in the
    /// database yet. Buckets are touched in the order of their last line item.
    fn put_event(
        &self,
        batch: &mut WriteBatch,
        event_batch: &EventBatch,
        pending: &HashMap<BucketId, BucketRecord>,
        sequence: &mut u64,
    ) -> Result<()> {
        let cf_events = self.cf(cf::EVENTS)?;
        let cf_by_account = self.cf(cf::EVENTS_BY_ACCOUNT)?;
        let cf_items = self.cf(cf::LINE_ITEMS)?;
        let cf_by_bucket = self.cf(cf::LINE_ITEMS_BY_BUCKET)?;

        let event = &event_batch.event;
        batch.put_cf(&cf_events, keys::event_key(&event.id), Self::serialize(event)?);
        batch.put_cf(
            &cf_by_account,
            keys::account_event_key(&event.account_id, event.occurred_on, &event.id),
            [],
        );

        let now = Utc::now();
        let mut touched: HashMap<BucketId, (usize, BucketRecord)> = HashMap::new();

        for (position, item) in event_batch.line_items.iter().enumerate() {
            batch.put_cf(
                &cf_items,
                keys::line_item_key(&event.id, &item.id),
                Self::serialize(item)?,
            );
            batch.put_cf(
                &cf_by_bucket,
                keys::bucket_line_item_key(&item.bucket_id, &event.id, &item.id),
                [],
            );

            if let Some(entry) = touched.get_mut(&item.bucket_id) {
                entry.0 = position;
                continue;
            }
            let bucket = match pending.get(&item.bucket_id) {
                Some(bucket) => bucket.clone(),
                None => self.get_bucket(&item.bucket_id)?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "bucket",
                        id: item.bucket_id.to_string(),
                    }
                })?,
            };
            touched.insert(item.bucket_id, (position, bucket));
        }

        let mut touched: Vec<(usize, BucketRecord)> = touched.into_values().collect();
        touched.sort_by_key(|(position, _)| *position);

        for (_, mut bucket) in touched {
            bucket.updated_at = now;
            let is_new = pending.contains_key(&bucket.id);
            self.put_bucket(batch, &bucket, is_new, sequence)?;
        }
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
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

        let _guard = self.lock()?;
        if self.get_account(&account.id)?.is_some() {
            return Err(StoreError::Database(format!(
                "account already exists: {}",
                account.id
            )));
        }

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let mut sequence = self.touch_sequence()?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.id),
            Self::serialize(account)?,
        );

        match opening {
            Some(event_batch) => {
                if event_batch.event.account_id != account.id {
                    return Err(StoreError::BucketMismatch {
                        bucket_id: default_bucket.id.to_string(),
                        account_id: account.id.to_string(),
                    });
                }
                validate_batch(event_batch, |bucket_id| {
                    if *bucket_id == default_bucket.id {
                        Ok(Some(account.id))
                    } else {
                        Ok(self.get_bucket(bucket_id)?.map(|bucket| bucket.account_id))
                    }
                })?;

                let pending = HashMap::from([(default_bucket.id, default_bucket.clone())]);
                if !event_batch
                    .line_items
                    .iter()
                    .any(|item| item.bucket_id == default_bucket.id)
                {
                    self.put_bucket(&mut batch, default_bucket, true, &mut sequence)?;
                }
                self.put_event(&mut batch, event_batch, &pending, &mut sequence)?;
            }
            None => self.put_bucket(&mut batch, default_bucket, true, &mut sequence)?,
        }

        self.put_touch_sequence(&mut batch, sequence)?;
        self.commit(batch)?;
        tracing::debug!(account_id = %account.id, "Account written");
        Ok(())
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get(cf::ACCOUNTS, &keys::account_key(account_id))
    }

    // =========================================================================
    // Bucket Operations
    // =========================================================================

    fn insert_bucket(&self, bucket: &BucketRecord) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_account(&bucket.account_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "account",
                id: bucket.account_id.to_string(),
            });
        }

        if bucket.role.is_reserved() {
            let cf_roles = self.cf(cf::BUCKET_ROLES)?;
            let taken = self
                .db
                .get_cf(&cf_roles, keys::bucket_role_key(&bucket.account_id, &bucket.role))
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if taken {
                return Err(StoreError::DuplicateRole {
                    account_id: bucket.account_id.to_string(),
                    role: bucket.role.to_string(),
                });
            }
        }

        let mut sequence = self.touch_sequence()?;
        let mut batch = WriteBatch::default();
        self.put_bucket(&mut batch, bucket, true, &mut sequence)?;
        self.put_touch_sequence(&mut batch, sequence)?;
        self.commit(batch)
    }

    fn get_bucket(&self, bucket_id: &BucketId) -> Result<Option<BucketRecord>> {
        self.get(cf::BUCKETS, &keys::bucket_key(bucket_id))
    }

    fn find_bucket_by_role(
        &self,
        account_id: &AccountId,
        role: &BucketRole,
    ) -> Result<Option<BucketRecord>> {
        if role.is_reserved() {
            let cf_roles = self.cf(cf::BUCKET_ROLES)?;
            let Some(raw) = self
                .db
                .get_cf(&cf_roles, keys::bucket_role_key(account_id, role))
                .map_err(|e| StoreError::Database(e.to_string()))?
            else {
                return Ok(None);
            };
            let bytes: [u8; 16] = raw
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Database("malformed role index value".into()))?;
            return self.get_bucket(&BucketId::from_bytes(bytes));
        }

        Ok(self
            .list_buckets(account_id)?
            .into_iter()
            .find(|bucket| &bucket.role == role))
    }

    fn list_buckets(&self, account_id: &AccountId) -> Result<Vec<BucketRecord>> {
        let prefix = keys::id_prefix(account_id.as_bytes());
        let mut buckets = Vec::new();

        for (key, _) in self.scan_prefix(cf::BUCKETS_BY_ACCOUNT, &prefix)? {
            let bucket_id = keys::extract_bucket_id(&key)
                .ok_or_else(|| StoreError::Database("malformed bucket index key".into()))?;
            if let Some(bucket) = self.get_bucket(&bucket_id)? {
                buckets.push(bucket);
            }
        }

        Ok(buckets)
    }

    fn recent_buckets(&self, account_id: &AccountId, limit: usize) -> Result<Vec<BucketRecord>> {
        let mut buckets = Vec::new();
        for bucket in self.list_buckets(account_id)? {
            let touched = self.bucket_touch(&bucket.id)?;
            buckets.push((bucket, touched));
        }

        buckets.sort_by(|(a, a_touch), (b, b_touch)| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b_touch.cmp(a_touch))
        });

        Ok(buckets
            .into_iter()
            .take(limit)
            .map(|(bucket, _)| bucket)
            .collect())
    }

    // =========================================================================
    // Event Operations
    // =========================================================================

    fn insert_event(&self, batch: &EventBatch) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_account(&batch.event.account_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "account",
                id: batch.event.account_id.to_string(),
            });
        }
        validate_batch(batch, |bucket_id| {
            Ok(self.get_bucket(bucket_id)?.map(|bucket| bucket.account_id))
        })?;

        let mut sequence = self.touch_sequence()?;
        let mut write = WriteBatch::default();
        self.put_event(&mut write, batch, &HashMap::new(), &mut sequence)?;
        self.put_touch_sequence(&mut write, sequence)?;
        self.commit(write)
    }

    fn list_line_items_by_account(&self, account_id: &AccountId) -> Result<Vec<LineItem>> {
        let mut items = Vec::new();
        for event_id in self.account_event_ids(account_id)? {
            items.extend(
                self.line_items_for_event(&event_id)?
                    .into_iter()
                    .filter(|item| item.account_id == *account_id),
            );
        }
        Ok(items)
    }

    fn list_line_items_by_bucket(&self, bucket_id: &BucketId) -> Result<Vec<LineItem>> {
        let cf_items = self.cf(cf::LINE_ITEMS)?;
        let prefix = keys::id_prefix(bucket_id.as_bytes());
        let mut items = Vec::new();

        for (key, _) in self.scan_prefix(cf::LINE_ITEMS_BY_BUCKET, &prefix)? {
            let item_key = keys::line_item_key_from_bucket_key(&key)
                .ok_or_else(|| StoreError::Database("malformed line item index key".into()))?;
            if let Some(data) = self
                .db
                .get_cf(&cf_items, item_key)
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                items.push(Self::deserialize(&data)?);
            }
        }

        Ok(items)
    }

    fn list_account_items(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AccountItem>> {
        let mut event_ids = self.account_event_ids(account_id)?;

        // Reverse to get newest first
        event_ids.reverse();

        let mut items = Vec::new();
        for event_id in event_ids.into_iter().skip(offset).take(limit) {
            let Some(event) = self.get::<Event>(cf::EVENTS, &keys::event_key(&event_id))? else {
                continue;
            };
            let line_items = self.line_items_for_event(&event_id)?;
            items.push(AccountItem { event, line_items });
        }

        Ok(items)
    }
}
