//! Transaction recorder: turns postings into an event written atomically.

use std::collections::HashMap;

use chrono::NaiveDate;

use envelope_core::{
    Account, BucketId, BucketRecord, BucketRole, Event, EventBatch, LedgerError, LineItem,
    LineItemRole, Posting, Result, StartingBalance, UserId, STARTING_BALANCE_ACTOR,
};
use envelope_store::Store;

use crate::balance::{ensure_headroom, BalanceEngine};

/// Records transactions against accounts.
pub struct TransactionRecorder<'a> {
    store: &'a dyn Store,
    balances: &'a BalanceEngine,
}

impl<'a> TransactionRecorder<'a> {
    pub(crate) fn new(store: &'a dyn Store, balances: &'a BalanceEngine) -> Self {
        Self { store, balances }
    }

    /// Post one event with a line item per posting.
    ///
    /// Either the event and all of its line items are committed, or nothing
    /// is. Cached balances of the account are invalidated before returning.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if `postings` is empty or would push
    ///   the account or a bucket outside the `i64` range.
    /// - `LedgerError::NotFound` if a posting targets an unknown bucket.
    /// - `LedgerError::BucketMismatch` if a posting targets another account's bucket.
    /// - `LedgerError::Persistence` if the atomic write fails.
    pub fn post_transaction(
        &self,
        account: &Account,
        occurred_on: NaiveDate,
        actor: &str,
        user_id: UserId,
        postings: &[Posting],
    ) -> Result<Event> {
        if postings.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "a transaction needs at least one posting".into(),
            ));
        }

        let event = Event::new(account, occurred_on, actor, user_id);
        let mut buckets: HashMap<BucketId, BucketRecord> = HashMap::new();
        let mut line_items = Vec::with_capacity(postings.len());

        for posting in postings {
            if !buckets.contains_key(&posting.bucket_id) {
                let bucket = self.store.get_bucket(&posting.bucket_id)?.ok_or_else(|| {
                    LedgerError::NotFound {
                        entity: "bucket",
                        id: posting.bucket_id.to_string(),
                    }
                })?;
                buckets.insert(posting.bucket_id, bucket);
            }
            let bucket = &buckets[&posting.bucket_id];
            line_items.push(LineItem::new(
                account.id,
                bucket,
                event.id,
                posting.amount_cents,
                posting.role,
            )?);
        }

        let batch = EventBatch { event, line_items };
        self.commit(&batch)?;
        Ok(batch.event)
    }

    /// Seed the starting balance of an account that has just been created.
    ///
    /// Posts a single deposit to the default bucket, dated on the starting
    /// balance's date, with the "Starting balance" actor. Absent or zero
    /// starting balances post nothing. An account is seeded at most once.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if the account already has a
    ///   starting balance event.
    /// - `LedgerError::NotFound` if the account has no default bucket.
    /// - `LedgerError::Persistence` if the atomic write fails.
    pub fn seed_starting_balance(
        &self,
        account: &Account,
        starting_balance: Option<&StartingBalance>,
    ) -> Result<Option<Event>> {
        if starting_balance.map_or(true, StartingBalance::is_zero) {
            return Ok(None);
        }
        if self.has_starting_balance(account)? {
            return Err(LedgerError::InvalidArgument(format!(
                "account {} already has a starting balance",
                account.id
            )));
        }

        let default_bucket = self
            .store
            .find_bucket_by_role(&account.id, &BucketRole::Default)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "default bucket",
                id: account.id.to_string(),
            })?;

        let Some(batch) = Self::starting_balance_batch(account, &default_bucket, starting_balance)?
        else {
            return Ok(None);
        };
        self.commit(&batch)?;
        Ok(Some(batch.event))
    }

    /// Build the event that seeds a starting balance, if one is due.
    pub(crate) fn starting_balance_batch(
        account: &Account,
        default_bucket: &BucketRecord,
        starting_balance: Option<&StartingBalance>,
    ) -> Result<Option<EventBatch>> {
        let Some(starting_balance) = starting_balance.filter(|sb| !sb.is_zero()) else {
            return Ok(None);
        };

        let event = Event::new(
            account,
            starting_balance.occurred_on,
            STARTING_BALANCE_ACTOR,
            account.author_id,
        );
        let item = LineItem::new(
            account.id,
            default_bucket,
            event.id,
            starting_balance.amount_cents,
            LineItemRole::Deposit,
        )?;

        Ok(Some(EventBatch {
            event,
            line_items: vec![item],
        }))
    }

    fn has_starting_balance(&self, account: &Account) -> Result<bool> {
        let history = self.store.list_account_items(&account.id, usize::MAX, 0)?;
        Ok(history
            .iter()
            .any(|item| item.event.actor == STARTING_BALANCE_ACTOR))
    }

    fn commit(&self, batch: &EventBatch) -> Result<()> {
        let account_id = batch.event.account_id;

        let snapshot = self.balances.snapshot(&account_id)?;
        ensure_headroom(
            &snapshot,
            &account_id,
            batch
                .line_items
                .iter()
                .map(|item| (item.bucket_id, item.amount_cents)),
        )?;

        if let Err(err) = self.store.insert_event(batch) {
            tracing::warn!(
                account_id = %account_id,
                event_id = %batch.event.id,
                error = %err,
                "Transaction write failed, nothing was recorded"
            );
            return Err(err.into());
        }

        self.balances.invalidate(&account_id)?;
        tracing::info!(
            account_id = %account_id,
            event_id = %batch.event.id,
            line_items = batch.line_items.len(),
            net_cents = batch.total_cents(),
            "Transaction recorded"
        );
        Ok(())
    }
}
