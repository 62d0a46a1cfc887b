//! Bucket (envelope) types.
//!
//! Buckets partition an account's funds. Two roles are reserved and may exist
//! at most once per account: `default` catches every unassigned amount and
//! `aside` holds funds that are not available for spending. Any other role is
//! a user-defined category.
//!
//! A [`Bucket`] is either a stored [`BucketRecord`] or a display-only
//! placeholder. Only records carry an identity, so nothing can be posted to a
//! placeholder.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, BucketId, LedgerError, Result, UserId};

/// Name given to the default bucket when an account is opened.
pub const DEFAULT_BUCKET_NAME: &str = "General";

/// Display name of the aside placeholder.
pub const ASIDE_BUCKET_NAME: &str = "Aside";

/// The semantic tag of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BucketRole {
    /// Catch-all funds. Exactly one per account.
    Default,

    /// Reserved funds that do not count as available. At most one per account.
    Aside,

    /// A user-defined category, stored lower-cased.
    Custom(String),
}

impl BucketRole {
    /// Parse a role, normalizing case and surrounding whitespace.
    #[must_use]
    pub fn parse(role: &str) -> Self {
        let normalized = role.trim().to_lowercase();
        match normalized.as_str() {
            "default" => Self::Default,
            "aside" => Self::Aside,
            _ => Self::Custom(normalized),
        }
    }

    /// The stored form of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Aside => "aside",
            Self::Custom(role) => role,
        }
    }

    /// Reserved roles may exist at most once per account.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Default | Self::Aside)
    }

    /// The role with its first letter upper-cased, used to name buckets
    /// created on demand.
    #[must_use]
    pub fn display_name(&self) -> String {
        capitalize(self.as_str())
    }
}

impl From<String> for BucketRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for BucketRole {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<BucketRole> for String {
    fn from(role: BucketRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for BucketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-case the first character and lower-case the rest.
#[must_use]
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// A persisted bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    /// The bucket ID.
    pub id: BucketId,

    /// The owning account.
    pub account_id: AccountId,

    /// Display name.
    pub name: String,

    /// Semantic role.
    pub role: BucketRole,

    /// The user who created the bucket.
    pub author_id: UserId,

    /// When the bucket was created.
    pub created_at: DateTime<Utc>,

    /// Last time the bucket or one of its postings changed.
    pub updated_at: DateTime<Utc>,
}

impl BucketRecord {
    /// Build a new bucket for an account. Nothing is persisted.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        role: BucketRole,
        author_id: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BucketId::generate(),
            account_id,
            name: name.into(),
            role,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A bucket as presented to callers: stored, or a transient placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bucket {
    /// A stored bucket.
    Persisted(BucketRecord),

    /// A display-only stand-in for a reserved bucket that does not exist yet.
    /// Has no identity and a zero balance.
    Placeholder {
        /// The reserved role being stood in for.
        role: BucketRole,
    },
}

impl Bucket {
    /// Placeholder for a missing default bucket.
    #[must_use]
    pub const fn default_placeholder() -> Self {
        Self::Placeholder {
            role: BucketRole::Default,
        }
    }

    /// Placeholder for a missing aside bucket.
    #[must_use]
    pub const fn aside_placeholder() -> Self {
        Self::Placeholder {
            role: BucketRole::Aside,
        }
    }

    /// The bucket's role.
    #[must_use]
    pub const fn role(&self) -> &BucketRole {
        match self {
            Self::Persisted(record) => &record.role,
            Self::Placeholder { role } => role,
        }
    }

    /// The bucket's display name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Persisted(record) => record.name.clone(),
            Self::Placeholder { role } => match role {
                BucketRole::Default => DEFAULT_BUCKET_NAME.to_string(),
                BucketRole::Aside => ASIDE_BUCKET_NAME.to_string(),
                BucketRole::Custom(_) => role.display_name(),
            },
        }
    }

    /// The stored identity, absent for placeholders.
    #[must_use]
    pub const fn id(&self) -> Option<BucketId> {
        match self {
            Self::Persisted(record) => Some(record.id),
            Self::Placeholder { .. } => None,
        }
    }

    /// The stored record, absent for placeholders.
    #[must_use]
    pub const fn as_record(&self) -> Option<&BucketRecord> {
        match self {
            Self::Persisted(record) => Some(record),
            Self::Placeholder { .. } => None,
        }
    }

    /// Whether this is a transient placeholder.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

impl From<BucketRecord> for Bucket {
    fn from(record: BucketRecord) -> Self {
        Self::Persisted(record)
    }
}

/// Check that `role` may be added to an account that already has `existing`.
///
/// # Errors
///
/// Returns `LedgerError::DuplicateRole` when a reserved role is already taken.
pub fn ensure_role_available(
    account_id: AccountId,
    existing: &[BucketRecord],
    role: &BucketRole,
) -> Result<()> {
    if !role.is_reserved() {
        return Ok(());
    }

    let taken = existing
        .iter()
        .any(|bucket| bucket.account_id == account_id && &bucket.role == role);

    if taken {
        return Err(LedgerError::DuplicateRole {
            account_id: account_id.to_string(),
            role: role.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_case_normalized() {
        assert_eq!(BucketRole::parse("DEFAULT"), BucketRole::Default);
        assert_eq!(BucketRole::parse(" Aside "), BucketRole::Aside);
        assert_eq!(
            BucketRole::parse("Groceries"),
            BucketRole::Custom("groceries".into())
        );
    }

    #[test]
    fn display_name_capitalizes() {
        assert_eq!(BucketRole::Aside.display_name(), "Aside");
        assert_eq!(BucketRole::parse("rENT").display_name(), "Rent");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn role_serializes_as_plain_string() {
        let json = serde_json::to_string(&BucketRole::parse("Savings")).unwrap();
        assert_eq!(json, "\"savings\"");
        let parsed: BucketRole = serde_json::from_str("\"aside\"").unwrap();
        assert_eq!(parsed, BucketRole::Aside);
    }

    #[test]
    fn reserved_roles_are_unique_per_account() {
        let account = AccountId::generate();
        let author = UserId::generate();
        let existing = vec![BucketRecord::new(
            account,
            DEFAULT_BUCKET_NAME,
            BucketRole::Default,
            author,
        )];

        let err = ensure_role_available(account, &existing, &BucketRole::Default).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRole { .. }));
        assert!(err.is_retryable());

        assert!(ensure_role_available(account, &existing, &BucketRole::Aside).is_ok());
        assert!(ensure_role_available(AccountId::generate(), &existing, &BucketRole::Default).is_ok());
    }

    #[test]
    fn custom_roles_may_repeat() {
        let account = AccountId::generate();
        let author = UserId::generate();
        let role = BucketRole::parse("fun");
        let existing = vec![BucketRecord::new(account, "Fun", role.clone(), author)];
        assert!(ensure_role_available(account, &existing, &role).is_ok());
    }

    #[test]
    fn placeholders_have_no_identity() {
        let placeholder = Bucket::aside_placeholder();
        assert!(placeholder.is_placeholder());
        assert!(placeholder.id().is_none());
        assert!(placeholder.as_record().is_none());
        assert_eq!(placeholder.name(), ASIDE_BUCKET_NAME);
        assert_eq!(Bucket::default_placeholder().name(), DEFAULT_BUCKET_NAME);
    }

    #[test]
    fn persisted_bucket_exposes_record() {
        let record = BucketRecord::new(
            AccountId::generate(),
            "Rent",
            BucketRole::parse("rent"),
            UserId::generate(),
        );
        let bucket = Bucket::from(record.clone());
        assert_eq!(bucket.id(), Some(record.id));
        assert_eq!(bucket.name(), "Rent");
        assert!(!bucket.is_placeholder());
    }
}
