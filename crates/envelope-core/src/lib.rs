//! Core types for the envelope ledger.
//!
//! This crate provides the entity model shared by the storage layer and the
//! ledger engine:
//!
//! - **Identifiers**: `AccountId`, `BucketId`, `EventId`, `LineItemId`, `UserId`, `SubscriptionId`
//! - **Accounts**: `Account`, `NewAccount`, `StartingBalance`
//! - **Buckets**: `Bucket`, `BucketRecord`, `BucketRole`
//! - **Events**: `Event`, `LineItem`, `Posting`, `EventBatch`, `AccountItem`
//!
//! # Amounts
//!
//! Every amount is a signed `i64` in minor units (cents). An account's
//! balance is the sum of its line items; a bucket's balance is the sum of the
//! line items posted to it. Balances are never stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod bucket;
pub mod error;
pub mod event;
pub mod ids;

pub use account::{Account, NewAccount, StartingBalance, STARTING_BALANCE_ACTOR};
pub use bucket::{
    capitalize, ensure_role_available, Bucket, BucketRecord, BucketRole, ASIDE_BUCKET_NAME,
    DEFAULT_BUCKET_NAME,
};
pub use error::{LedgerError, Result};
pub use event::{AccountItem, Event, EventBatch, LineItem, LineItemRole, Posting};
pub use ids::{AccountId, BucketId, EventId, IdError, LineItemId, SubscriptionId, UserId};
