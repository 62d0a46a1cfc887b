//! Events and the line items they post.
//!
//! An [`Event`] is one real-world occurrence ("grocery run", "paycheck").
//! It owns the signed [`LineItem`]s that move money into or out of buckets,
//! and the two are always written together as an [`EventBatch`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Account, AccountId, BucketId, BucketRecord, EventId, LedgerError, LineItemId, Result,
    SubscriptionId, UserId,
};

/// A recorded occurrence that groups one or more postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID (ULID for time-ordering).
    pub id: EventId,

    /// The account the event was posted to.
    pub account_id: AccountId,

    /// The subscription owning the account.
    pub subscription_id: SubscriptionId,

    /// The date the occurrence happened.
    pub occurred_on: NaiveDate,

    /// Who or what caused it, as free text.
    pub actor: String,

    /// The user who recorded it.
    pub user_id: UserId,

    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event for an account.
    #[must_use]
    pub fn new(
        account: &Account,
        occurred_on: NaiveDate,
        actor: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            id: EventId::generate(),
            account_id: account.id,
            subscription_id: account.subscription_id,
            occurred_on,
            actor: actor.into(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// What a posting does to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemRole {
    /// Money coming into the account.
    Deposit,

    /// Money leaving the account.
    Withdrawal,

    /// Money moving between accounts.
    Transfer,

    /// Money moving between buckets of the same account.
    Reallocation,
}

/// A signed posting against one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Unique line item ID.
    pub id: LineItemId,

    /// The account the amount is posted to.
    pub account_id: AccountId,

    /// The bucket the amount is posted to.
    pub bucket_id: BucketId,

    /// The event that owns this posting.
    pub event_id: EventId,

    /// Amount in minor units. Positive = into the bucket, negative = out.
    pub amount_cents: i64,

    /// Kind of posting.
    pub role: LineItemRole,

    /// When the posting was recorded.
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    /// Build a posting of `amount_cents` into `bucket`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BucketMismatch` if `bucket` is not owned by `account_id`.
    pub fn new(
        account_id: AccountId,
        bucket: &BucketRecord,
        event_id: EventId,
        amount_cents: i64,
        role: LineItemRole,
    ) -> Result<Self> {
        if bucket.account_id != account_id {
            return Err(LedgerError::BucketMismatch {
                bucket_id: bucket.id.to_string(),
                account_id: account_id.to_string(),
            });
        }

        Ok(Self {
            id: LineItemId::generate(),
            account_id,
            bucket_id: bucket.id,
            event_id,
            amount_cents,
            role,
            created_at: Utc::now(),
        })
    }
}

/// A requested posting, before it is turned into a [`LineItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Target bucket.
    pub bucket_id: BucketId,

    /// Signed amount in minor units.
    pub amount_cents: i64,

    /// Kind of posting.
    pub role: LineItemRole,
}

impl Posting {
    /// Create a posting.
    #[must_use]
    pub const fn new(bucket_id: BucketId, amount_cents: i64, role: LineItemRole) -> Self {
        Self {
            bucket_id,
            amount_cents,
            role,
        }
    }

    /// A deposit into `bucket_id`.
    #[must_use]
    pub const fn deposit(bucket_id: BucketId, amount_cents: i64) -> Self {
        Self::new(bucket_id, amount_cents, LineItemRole::Deposit)
    }

    /// A withdrawal from `bucket_id`. The amount is always stored negative;
    /// `i64::MIN` is clamped to `-i64::MAX`.
    #[must_use]
    pub const fn withdrawal(bucket_id: BucketId, amount_cents: i64) -> Self {
        Self::new(bucket_id, -amount_cents.saturating_abs(), LineItemRole::Withdrawal)
    }
}

fn saturating_total(items: &[LineItem]) -> i64 {
    items
        .iter()
        .fold(0i64, |total, item| total.saturating_add(item.amount_cents))
}

/// An event together with every line item it owns: the unit of atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    /// The event.
    pub event: Event,

    /// Its postings, all referencing `event.id`.
    pub line_items: Vec<LineItem>,
}

impl EventBatch {
    /// Net amount of the batch, saturating at the `i64` bounds.
    #[must_use]
    pub fn total_cents(&self) -> i64 {
        saturating_total(&self.line_items)
    }
}

/// One row of an account's history: an event and the postings it made to
/// the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountItem {
    /// The event.
    pub event: Event,

    /// The event's line items.
    pub line_items: Vec<LineItem>,
}

impl AccountItem {
    /// Net effect of the event on the account.
    #[must_use]
    pub fn amount_cents(&self) -> i64 {
        saturating_total(&self.line_items)
    }
}

impl From<EventBatch> for AccountItem {
    fn from(batch: EventBatch) -> Self {
        Self {
            event: batch.event,
            line_items: batch.line_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BucketRole;

    fn new_account() -> Account {
        Account::new(SubscriptionId::generate(), UserId::generate())
    }

    #[test]
    fn event_inherits_account_scope() {
        let account = new_account();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let event = Event::new(&account, date, "Grocer", account.author_id);
        assert_eq!(event.account_id, account.id);
        assert_eq!(event.subscription_id, account.subscription_id);
        assert_eq!(event.occurred_on, date);
    }

    #[test]
    fn line_item_rejects_foreign_bucket() {
        let account = new_account();
        let other = new_account();
        let bucket = BucketRecord::new(other.id, "General", BucketRole::Default, other.author_id);

        let err = LineItem::new(
            account.id,
            &bucket,
            EventId::generate(),
            100,
            LineItemRole::Deposit,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::BucketMismatch { .. }));
    }

    #[test]
    fn withdrawal_is_always_negative() {
        let bucket = BucketId::generate();
        assert_eq!(Posting::withdrawal(bucket, 250).amount_cents, -250);
        assert_eq!(Posting::withdrawal(bucket, -250).amount_cents, -250);
        assert_eq!(Posting::withdrawal(bucket, i64::MIN).amount_cents, -i64::MAX);
        assert_eq!(Posting::deposit(bucket, 250).amount_cents, 250);
    }

    #[test]
    fn account_item_nets_its_postings() {
        let account = new_account();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let event = Event::new(&account, date, "Move", account.author_id);
        let a = BucketRecord::new(account.id, "A", BucketRole::parse("a"), account.author_id);
        let b = BucketRecord::new(account.id, "B", BucketRole::parse("b"), account.author_id);
        let batch = EventBatch {
            line_items: vec![
                LineItem::new(account.id, &a, event.id, -300, LineItemRole::Reallocation).unwrap(),
                LineItem::new(account.id, &b, event.id, 300, LineItemRole::Reallocation).unwrap(),
            ],
            event,
        };
        assert_eq!(batch.total_cents(), 0);
        assert_eq!(AccountItem::from(batch).amount_cents(), 0);
    }

    #[test]
    fn batch_total_saturates() {
        let account = new_account();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let event = Event::new(&account, date, "Huge", account.author_id);
        let a = BucketRecord::new(account.id, "A", BucketRole::parse("a"), account.author_id);
        let batch = EventBatch {
            line_items: vec![
                LineItem::new(account.id, &a, event.id, i64::MAX, LineItemRole::Deposit).unwrap(),
                LineItem::new(account.id, &a, event.id, i64::MAX, LineItemRole::Deposit).unwrap(),
            ],
            event,
        };
        assert_eq!(batch.total_cents(), i64::MAX);
    }
}
