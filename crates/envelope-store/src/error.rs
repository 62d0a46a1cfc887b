//! Error types for ledger storage.

use envelope_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed. Nothing from the failed write is visible.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Uniqueness of `(account, role)` for a reserved role was violated.
    #[error("bucket role already exists: account={account_id}, role={role}")]
    DuplicateRole {
        /// The account.
        account_id: String,
        /// The reserved role.
        role: String,
    },

    /// A line item references a bucket owned by another account.
    #[error("bucket {bucket_id} does not belong to account {account_id}")]
    BucketMismatch {
        /// The offending bucket.
        bucket_id: String,
        /// The account the line item targets.
        account_id: String,
    },
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::DuplicateRole { account_id, role } => {
                Self::DuplicateRole { account_id, role }
            }
            StoreError::BucketMismatch {
                bucket_id,
                account_id,
            } => Self::BucketMismatch {
                bucket_id,
                account_id,
            },
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Persistence(msg),
        }
    }
}
