//! Error types for the envelope ledger.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A reserved bucket role (`default` or `aside`) already exists on the account.
    ///
    /// Recoverable: the caller should look the bucket up again.
    #[error("bucket role already exists: account={account_id}, role={role}")]
    DuplicateRole {
        /// The account that already holds the role.
        account_id: String,
        /// The reserved role.
        role: String,
    },

    /// A line item targets a bucket that belongs to another account.
    #[error("bucket {bucket_id} does not belong to account {account_id}")]
    BucketMismatch {
        /// The offending bucket.
        bucket_id: String,
        /// The account the line item was posted to.
        account_id: String,
    },

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying atomic write or read failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Whether retrying the lookup can resolve the error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateRole { .. })
    }
}
