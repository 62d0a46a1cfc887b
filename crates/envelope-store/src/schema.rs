//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Bucket records, keyed by `bucket_id`.
    pub const BUCKETS: &str = "buckets";

    /// Index: buckets by account, keyed by `account_id || created_at || bucket_id`.
    /// Value is empty (index only).
    pub const BUCKETS_BY_ACCOUNT: &str = "buckets_by_account";

    /// Unique index over reserved roles, keyed by `account_id || role`.
    /// Value is the `bucket_id`.
    pub const BUCKET_ROLES: &str = "bucket_roles";

    /// Event records, keyed by `event_id` (ULID).
    pub const EVENTS: &str = "events";

    /// Index: events by account, keyed by `account_id || occurred_on || event_id`.
    /// Value is empty (index only).
    pub const EVENTS_BY_ACCOUNT: &str = "events_by_account";

    /// Line items, keyed by `event_id || line_item_id` so an event's postings are contiguous.
    pub const LINE_ITEMS: &str = "line_items";

    /// Index: line items by bucket, keyed by `bucket_id || event_id || line_item_id`.
    /// Value is empty (index only).
    pub const LINE_ITEMS_BY_BUCKET: &str = "line_items_by_bucket";

    /// Last touch sequence per bucket, keyed by `bucket_id`. Value is a big-endian `u64`.
    pub const BUCKET_TOUCHES: &str = "bucket_touches";

    /// Store-wide counters, keyed by name.
    pub const META: &str = "meta";
}

/// Key in [`cf::META`] holding the last bucket touch sequence handed out.
pub const TOUCH_SEQUENCE_KEY: &[u8] = b"touch_sequence";

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::BUCKETS,
        cf::BUCKETS_BY_ACCOUNT,
        cf::BUCKET_ROLES,
        cf::EVENTS,
        cf::EVENTS_BY_ACCOUNT,
        cf::LINE_ITEMS,
        cf::LINE_ITEMS_BY_BUCKET,
        cf::BUCKET_TOUCHES,
        cf::META,
    ]
}
