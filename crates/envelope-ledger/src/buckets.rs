//! Bucket manager: role lookup and creation, listings for display.

use envelope_core::{
    ensure_role_available, Account, Bucket, BucketRecord, BucketRole, LedgerError, Result, UserId,
};
use envelope_store::{Store, StoreError};

use crate::config::LedgerConfig;

/// Bucket operations scoped to one account.
pub struct BucketManager<'a> {
    store: &'a dyn Store,
    account: &'a Account,
    config: &'a LedgerConfig,
}

impl<'a> BucketManager<'a> {
    pub(crate) fn new(store: &'a dyn Store, account: &'a Account, config: &'a LedgerConfig) -> Self {
        Self {
            store,
            account,
            config,
        }
    }

    /// Return the account's bucket for `role`, creating it if none exists.
    ///
    /// The role is lower-cased; a created bucket is named after the
    /// capitalized role and authored by `actor`. When a concurrent caller
    /// creates the same reserved role first, the lookup is retried and the
    /// winner's bucket returned. Up to `role_retry_attempts` lost races are
    /// followed by a fresh lookup.
    ///
    /// # Errors
    ///
    /// - `LedgerError::DuplicateRole` if every retry lost the race.
    /// - `LedgerError::Persistence` if the store fails.
    pub fn for_role(&self, role: &str, actor: UserId) -> Result<BucketRecord> {
        let role = BucketRole::parse(role);
        let mut lost_races = 0;

        loop {
            if let Some(existing) = self.store.find_bucket_by_role(&self.account.id, &role)? {
                return Ok(existing);
            }

            let bucket = BucketRecord::new(self.account.id, role.display_name(), role.clone(), actor);
            match self.store.insert_bucket(&bucket) {
                Ok(()) => {
                    tracing::debug!(
                        account_id = %self.account.id,
                        bucket_id = %bucket.id,
                        role = %role,
                        "Bucket created for role"
                    );
                    return Ok(bucket);
                }
                Err(StoreError::DuplicateRole { .. })
                    if lost_races < self.config.role_retry_attempts =>
                {
                    lost_races += 1;
                    tracing::warn!(
                        account_id = %self.account.id,
                        role = %role,
                        lost_races,
                        "Lost bucket creation race, retrying lookup"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Create a bucket explicitly.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if `name` is blank.
    /// - `LedgerError::DuplicateRole` if `role` is reserved and already taken.
    /// - `LedgerError::Persistence` if the store fails.
    pub fn create(&self, name: &str, role: &str, actor: UserId) -> Result<BucketRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "bucket name must not be blank".into(),
            ));
        }

        let role = BucketRole::parse(role);
        let existing = self.store.list_buckets(&self.account.id)?;
        ensure_role_available(self.account.id, &existing, &role)?;

        let bucket = BucketRecord::new(self.account.id, name, role, actor);
        self.store.insert_bucket(&bucket)?;
        tracing::debug!(account_id = %self.account.id, bucket_id = %bucket.id, "Bucket created");
        Ok(bucket)
    }

    /// Every bucket of the account, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the store fails.
    pub fn sorted(&self) -> Result<Vec<BucketRecord>> {
        let mut buckets = self.store.list_buckets(&self.account.id)?;
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// The account's default bucket, if it exists yet.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the store fails.
    pub fn default_bucket(&self) -> Result<Option<BucketRecord>> {
        Ok(self
            .store
            .find_bucket_by_role(&self.account.id, &BucketRole::Default)?)
    }

    /// The `n` most recently updated buckets, ordered by name.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if `n` is zero.
    /// - `LedgerError::Persistence` if the store fails.
    pub fn recent(&self, n: usize) -> Result<Vec<BucketRecord>> {
        if n == 0 {
            return Err(LedgerError::InvalidArgument(
                "recent bucket count must be positive".into(),
            ));
        }
        let mut buckets = self.store.recent_buckets(&self.account.id, n)?;
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// [`recent`](Self::recent) with the configured count.
    ///
    /// # Errors
    ///
    /// See [`recent`](Self::recent).
    pub fn recent_default(&self) -> Result<Vec<BucketRecord>> {
        self.recent(self.config.recent_limit)
    }

    /// Every stored bucket, followed by placeholders for a missing default
    /// and a missing aside bucket. Placeholders are never persisted.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the store fails.
    pub fn with_defaults(&self) -> Result<Vec<Bucket>> {
        let stored = self.store.list_buckets(&self.account.id)?;
        let has_default = stored.iter().any(|b| b.role == BucketRole::Default);
        let has_aside = stored.iter().any(|b| b.role == BucketRole::Aside);

        let mut buckets: Vec<Bucket> = stored.into_iter().map(Bucket::from).collect();
        if !has_default {
            buckets.push(Bucket::default_placeholder());
        }
        if !has_aside {
            buckets.push(Bucket::aside_placeholder());
        }
        Ok(buckets)
    }
}
