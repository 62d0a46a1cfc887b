//! Balance engine.
//!
//! Balances are derived from line items, never stored. Per account, the
//! engine memoizes one [`BalanceSnapshot`] holding the account total and every
//! bucket total, computed from a single read of the account's postings, so
//! the bucket totals always add up to the account total.
//!
//! Any write that adds line items must call [`BalanceEngine::invalidate`]
//! before returning. Each invalidation bumps a per-account generation; a
//! snapshot computed under an older generation is returned to its reader but
//! never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use envelope_core::{
    Account, AccountId, Bucket, BucketId, BucketRecord, BucketRole, LedgerError, LineItem, Result,
};
use envelope_store::Store;

/// Account and bucket totals computed from one read of an account's postings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    total_cents: i64,
    by_bucket: HashMap<BucketId, i64>,
    aside_bucket: Option<BucketId>,
}

impl BalanceSnapshot {
    /// Sum `items` into account and bucket totals.
    ///
    /// Sums are accumulated in `i128`; a total outside the `i64` range is an
    /// error rather than a wrapped value.
    fn from_line_items(
        account_id: &AccountId,
        items: &[LineItem],
        aside_bucket: Option<BucketId>,
    ) -> Result<Self> {
        let mut total: i128 = 0;
        let mut by_bucket: HashMap<BucketId, i128> = HashMap::new();
        for item in items {
            total += i128::from(item.amount_cents);
            *by_bucket.entry(item.bucket_id).or_insert(0) += i128::from(item.amount_cents);
        }

        Ok(Self {
            total_cents: to_cents(account_id, total)?,
            by_bucket: by_bucket
                .into_iter()
                .map(|(bucket_id, cents)| Ok((bucket_id, to_cents(account_id, cents)?)))
                .collect::<Result<_>>()?,
            aside_bucket,
        })
    }

    /// The account balance.
    #[must_use]
    pub const fn account_cents(&self) -> i64 {
        self.total_cents
    }

    /// The balance of one bucket; zero when nothing was posted to it.
    #[must_use]
    pub fn bucket_cents(&self, bucket_id: &BucketId) -> i64 {
        self.by_bucket.get(bucket_id).copied().unwrap_or(0)
    }

    /// Positive funds held in the aside bucket.
    #[must_use]
    pub fn unavailable_cents(&self) -> i64 {
        self.aside_bucket
            .map_or(0, |aside| self.bucket_cents(&aside).max(0))
    }
}

/// Narrow a summed balance back to `i64`.
fn to_cents(account_id: &AccountId, total: i128) -> Result<i64> {
    i64::try_from(total).map_err(|_| {
        LedgerError::Persistence(format!(
            "balance of account {account_id} is outside the i64 range"
        ))
    })
}

/// Whether every total stays within `i64` after adding `postings`.
///
/// # Errors
///
/// Returns `LedgerError::InvalidArgument` naming the first total that would overflow.
pub(crate) fn ensure_headroom(
    snapshot: &BalanceSnapshot,
    account_id: &AccountId,
    postings: impl IntoIterator<Item = (BucketId, i64)>,
) -> Result<()> {
    let mut total = i128::from(snapshot.account_cents());
    let mut by_bucket: HashMap<BucketId, i128> = HashMap::new();
    for (bucket_id, amount) in postings {
        total += i128::from(amount);
        *by_bucket
            .entry(bucket_id)
            .or_insert_with(|| i128::from(snapshot.bucket_cents(&bucket_id))) += i128::from(amount);
    }

    if i64::try_from(total).is_err() {
        return Err(LedgerError::InvalidArgument(format!(
            "posting would overflow the balance of account {account_id}"
        )));
    }
    if let Some((bucket_id, _)) = by_bucket
        .iter()
        .find(|(_, cents)| i64::try_from(**cents).is_err())
    {
        return Err(LedgerError::InvalidArgument(format!(
            "posting would overflow the balance of bucket {bucket_id}"
        )));
    }
    Ok(())
}

/// The three headline figures of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    /// Sum of every line item.
    pub balance_cents: i64,

    /// Positive funds set aside.
    pub unavailable_cents: i64,

    /// `balance_cents - unavailable_cents`.
    pub available_cents: i64,
}

/// Result of recomputing an account from storage, bypassing the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Sum of the account's line items.
    pub account_cents: i64,

    /// Sum over the account's buckets of each bucket's line items.
    pub bucket_sum_cents: i64,

    /// Per-bucket totals, in bucket creation order.
    pub buckets: Vec<(BucketId, i64)>,
}

impl Reconciliation {
    /// Whether the buckets exhaustively partition the account's funds.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.account_cents == self.bucket_sum_cents
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    generation: u64,
    snapshot: Option<Arc<BalanceSnapshot>>,
}

/// Computes and memoizes balances.
pub struct BalanceEngine {
    store: Arc<dyn Store>,
    cache: Mutex<HashMap<AccountId, CacheEntry>>,
}

impl BalanceEngine {
    /// Create an engine reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<AccountId, CacheEntry>>> {
        self.cache
            .lock()
            .map_err(|_| LedgerError::Persistence("balance cache lock poisoned".into()))
    }

    /// The current snapshot for an account, computing it if needed.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn snapshot(&self, account_id: &AccountId) -> Result<Arc<BalanceSnapshot>> {
        let generation = {
            let mut cache = self.cache()?;
            let entry = cache.entry(*account_id).or_default();
            if let Some(snapshot) = &entry.snapshot {
                tracing::debug!(account_id = %account_id, "Balance cache hit");
                return Ok(Arc::clone(snapshot));
            }
            entry.generation
        };

        let items = self.store.list_line_items_by_account(account_id)?;
        let aside = self
            .store
            .find_bucket_by_role(account_id, &BucketRole::Aside)?
            .map(|bucket| bucket.id);
        let snapshot = Arc::new(BalanceSnapshot::from_line_items(account_id, &items, aside)?);

        let mut cache = self.cache()?;
        let entry = cache.entry(*account_id).or_default();
        if entry.generation == generation {
            entry.snapshot = Some(Arc::clone(&snapshot));
        } else {
            tracing::debug!(account_id = %account_id, "Discarding snapshot computed before invalidation");
        }

        Ok(snapshot)
    }

    /// Drop the memoized balances of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn invalidate(&self, account_id: &AccountId) -> Result<()> {
        let mut cache = self.cache()?;
        let entry = cache.entry(*account_id).or_default();
        entry.generation += 1;
        entry.snapshot = None;
        tracing::debug!(account_id = %account_id, generation = entry.generation, "Balances invalidated");
        Ok(())
    }

    /// Sum of the line items posted to a bucket.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn bucket_balance(&self, bucket: &BucketRecord) -> Result<i64> {
        Ok(self.snapshot(&bucket.account_id)?.bucket_cents(&bucket.id))
    }

    /// Balance of a bucket as displayed; placeholders are always zero.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn balance_of(&self, bucket: &Bucket) -> Result<i64> {
        match bucket {
            Bucket::Persisted(record) => self.bucket_balance(record),
            Bucket::Placeholder { .. } => Ok(0),
        }
    }

    /// Sum of every line item posted to an account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn account_balance(&self, account: &Account) -> Result<i64> {
        Ok(self.snapshot(&account.id)?.account_cents())
    }

    /// The aside bucket's balance when it exists and is positive, else zero.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn unavailable_balance(&self, account: &Account) -> Result<i64> {
        Ok(self.snapshot(&account.id)?.unavailable_cents())
    }

    /// Account balance minus unavailable balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn available_balance(&self, account: &Account) -> Result<i64> {
        Ok(self.summary(account)?.available_cents)
    }

    /// All headline figures from one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn summary(&self, account: &Account) -> Result<BalanceSummary> {
        let snapshot = self.snapshot(&account.id)?;
        let balance_cents = snapshot.account_cents();
        let unavailable_cents = snapshot.unavailable_cents();
        Ok(BalanceSummary {
            balance_cents,
            unavailable_cents,
            available_cents: balance_cents - unavailable_cents,
        })
    }

    /// Recompute an account straight from storage, per bucket, without
    /// touching the cache.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the postings cannot be read.
    pub fn reconcile(&self, account: &Account) -> Result<Reconciliation> {
        let sum = |items: &[LineItem]| -> i128 {
            items.iter().map(|item| i128::from(item.amount_cents)).sum()
        };

        let account_total = sum(&self.store.list_line_items_by_account(&account.id)?);

        let mut bucket_total: i128 = 0;
        let mut buckets = Vec::new();
        for bucket in self.store.list_buckets(&account.id)? {
            let total = sum(&self.store.list_line_items_by_bucket(&bucket.id)?);
            bucket_total += total;
            buckets.push((bucket.id, to_cents(&account.id, total)?));
        }
        let account_cents = to_cents(&account.id, account_total)?;
        let bucket_sum_cents = to_cents(&account.id, bucket_total)?;

        let reconciliation = Reconciliation {
            account_cents,
            bucket_sum_cents,
            buckets,
        };
        if !reconciliation.is_balanced() {
            tracing::error!(
                account_id = %account.id,
                account_cents,
                bucket_sum_cents,
                "Bucket balances do not add up to the account balance"
            );
        }
        Ok(reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelope_core::{EventId, LineItemRole, SubscriptionId, UserId};

    fn item(account: &Account, bucket: &BucketRecord, amount: i64) -> LineItem {
        LineItem::new(account.id, bucket, EventId::generate(), amount, LineItemRole::Deposit).unwrap()
    }

    #[test]
    fn snapshot_partitions_the_total() {
        let author = UserId::generate();
        let account = Account::new(SubscriptionId::generate(), author);
        let general = BucketRecord::new(account.id, "General", BucketRole::Default, author);
        let aside = BucketRecord::new(account.id, "Aside", BucketRole::Aside, author);

        let items = vec![
            item(&account, &general, 1_000),
            item(&account, &aside, 300),
            item(&account, &general, -250),
        ];
        let snapshot = BalanceSnapshot::from_line_items(&account.id, &items, Some(aside.id)).unwrap();

        assert_eq!(snapshot.account_cents(), 1_050);
        assert_eq!(snapshot.bucket_cents(&general.id), 750);
        assert_eq!(snapshot.bucket_cents(&aside.id), 300);
        assert_eq!(snapshot.bucket_cents(&BucketId::generate()), 0);
        assert_eq!(snapshot.unavailable_cents(), 300);
    }

    #[test]
    fn negative_aside_is_not_unavailable() {
        let author = UserId::generate();
        let account = Account::new(SubscriptionId::generate(), author);
        let aside = BucketRecord::new(account.id, "Aside", BucketRole::Aside, author);

        let snapshot =
            BalanceSnapshot::from_line_items(&account.id, &[item(&account, &aside, -40)], Some(aside.id))
                .unwrap();
        assert_eq!(snapshot.unavailable_cents(), 0);

        let without_aside = BalanceSnapshot::from_line_items(&account.id, &[], None).unwrap();
        assert_eq!(without_aside.unavailable_cents(), 0);
    }

    #[test]
    fn extreme_sums_do_not_wrap() {
        let author = UserId::generate();
        let account = Account::new(SubscriptionId::generate(), author);
        let general = BucketRecord::new(account.id, "General", BucketRole::Default, author);
        let rent = BucketRecord::new(account.id, "Rent", BucketRole::parse("rent"), author);

        // Intermediate sums leave the i64 range but the totals fit.
        let items = vec![
            item(&account, &general, i64::MAX),
            item(&account, &rent, i64::MAX),
            item(&account, &rent, -i64::MAX),
        ];
        let snapshot = BalanceSnapshot::from_line_items(&account.id, &items, None).unwrap();
        assert_eq!(snapshot.account_cents(), i64::MAX);
        assert_eq!(snapshot.bucket_cents(&rent.id), 0);

        let items = vec![item(&account, &general, i64::MAX), item(&account, &general, 1)];
        assert!(matches!(
            BalanceSnapshot::from_line_items(&account.id, &items, None),
            Err(LedgerError::Persistence(_))
        ));
    }

    #[test]
    fn headroom_rejects_overflowing_postings() {
        let author = UserId::generate();
        let account = Account::new(SubscriptionId::generate(), author);
        let general = BucketRecord::new(account.id, "General", BucketRole::Default, author);
        let rent = BucketRecord::new(account.id, "Rent", BucketRole::parse("rent"), author);
        let snapshot =
            BalanceSnapshot::from_line_items(&account.id, &[item(&account, &general, i64::MAX - 10)], None)
                .unwrap();

        assert!(ensure_headroom(&snapshot, &account.id, [(general.id, 10)]).is_ok());
        assert!(ensure_headroom(&snapshot, &account.id, [(general.id, -20), (rent.id, 20)]).is_ok());
        assert!(matches!(
            ensure_headroom(&snapshot, &account.id, [(general.id, 11)]),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            ensure_headroom(&snapshot, &account.id, [(rent.id, i64::MAX), (rent.id, 1), (general.id, -i64::MAX)]),
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}
