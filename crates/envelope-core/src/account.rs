//! Account types for the envelope ledger.
//!
//! An account never stores its balance. Every figure is derived from the line
//! items posted to it, so the account record only carries ownership and
//! bookkeeping timestamps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, SubscriptionId, UserId};

/// Actor label recorded on the event that seeds a starting balance.
pub const STARTING_BALANCE_ACTOR: &str = "Starting balance";

/// A budgeting account whose funds are partitioned into buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID.
    pub id: AccountId,

    /// The subscription that owns the account.
    pub subscription_id: SubscriptionId,

    /// The user who created the account.
    pub author_id: UserId,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account record.
    #[must_use]
    pub fn new(subscription_id: SubscriptionId, author_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            subscription_id,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Funds the account already held when it was opened.
///
/// Supplied once, at creation time, and turned into a deposit on the default
/// bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingBalance {
    /// Amount in minor units.
    pub amount_cents: i64,

    /// The date the funds are booked on.
    pub occurred_on: NaiveDate,
}

impl StartingBalance {
    /// Create a starting balance.
    #[must_use]
    pub const fn new(amount_cents: i64, occurred_on: NaiveDate) -> Self {
        Self {
            amount_cents,
            occurred_on,
        }
    }

    /// A zero starting balance posts nothing.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount_cents == 0
    }
}

/// Parameters for opening an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    /// The owning subscription.
    pub subscription_id: SubscriptionId,

    /// The user opening the account.
    pub author_id: UserId,

    /// Optional one-time starting balance.
    #[serde(default)]
    pub starting_balance: Option<StartingBalance>,
}

impl NewAccount {
    /// Open an account without a starting balance.
    #[must_use]
    pub const fn new(subscription_id: SubscriptionId, author_id: UserId) -> Self {
        Self {
            subscription_id,
            author_id,
            starting_balance: None,
        }
    }

    /// Attach a starting balance.
    #[must_use]
    pub const fn with_starting_balance(mut self, starting_balance: StartingBalance) -> Self {
        self.starting_balance = Some(starting_balance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_fresh_identity() {
        let subscription = SubscriptionId::generate();
        let author = UserId::generate();
        let a = Account::new(subscription, author);
        let b = Account::new(subscription, author);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn zero_starting_balance_is_detected() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(StartingBalance::new(0, date).is_zero());
        assert!(!StartingBalance::new(-50, date).is_zero());
    }

    #[test]
    fn new_account_deserializes_without_starting_balance() {
        let json = serde_json::json!({
            "subscription_id": SubscriptionId::generate().to_string(),
            "author_id": UserId::generate().to_string(),
        });
        let parsed: NewAccount = serde_json::from_value(json).unwrap();
        assert!(parsed.starting_balance.is_none());
    }
}
