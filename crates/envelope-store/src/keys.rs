//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys are plain byte concatenations. Signed components (dates,
//! timestamps) are stored big-endian with the sign bit flipped so that byte
//! order matches numeric order.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use envelope_core::{AccountId, BucketId, BucketRole, EventId, LineItemId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a bucket key from a bucket ID.
#[must_use]
pub fn bucket_key(bucket_id: &BucketId) -> Vec<u8> {
    bucket_id.as_bytes().to_vec()
}

/// Create an account-bucket index key.
///
/// Format: `account_id (16) || created_at micros (8) || bucket_id (16)`
#[must_use]
pub fn account_bucket_key(
    account_id: &AccountId,
    created_at: DateTime<Utc>,
    bucket_id: &BucketId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&ordered_i64(created_at.timestamp_micros()));
    key.extend_from_slice(bucket_id.as_bytes());
    key
}

/// Extract the bucket ID from an account-bucket index key.
///
/// Returns `None` if the key is shorter than 40 bytes.
#[must_use]
pub fn extract_bucket_id(key: &[u8]) -> Option<BucketId> {
    let bytes: [u8; 16] = key.get(24..40)?.try_into().ok()?;
    Some(BucketId::from_bytes(bytes))
}

/// Create a reserved-role index key.
///
/// Format: `account_id (16) || role (utf-8)`
#[must_use]
pub fn bucket_role_key(account_id: &AccountId, role: &BucketRole) -> Vec<u8> {
    let mut key = account_id.as_bytes().to_vec();
    key.extend_from_slice(role.as_str().as_bytes());
    key
}

/// Create an event key from an event ID.
#[must_use]
pub fn event_key(event_id: &EventId) -> Vec<u8> {
    event_id.to_bytes().to_vec()
}

/// Create an account-event index key.
///
/// Format: `account_id (16) || occurred_on day (4) || event_id (16)`
///
/// Ascending key order is ascending `occurred_on`, then event creation time.
#[must_use]
pub fn account_event_key(
    account_id: &AccountId,
    occurred_on: NaiveDate,
    event_id: &EventId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&ordered_i32(occurred_on.num_days_from_ce()));
    key.extend_from_slice(&event_id.to_bytes());
    key
}

/// Extract the event ID from an account-event index key.
///
/// Returns `None` if the key is shorter than 36 bytes.
#[must_use]
pub fn extract_event_id(key: &[u8]) -> Option<EventId> {
    let bytes: [u8; 16] = key.get(20..36)?.try_into().ok()?;
    Some(EventId::from_bytes(bytes))
}

/// Create a line item key.
///
/// Format: `event_id (16) || line_item_id (16)`
#[must_use]
pub fn line_item_key(event_id: &EventId, line_item_id: &LineItemId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&event_id.to_bytes());
    key.extend_from_slice(line_item_id.as_bytes());
    key
}

/// Create a prefix for iterating all line items of an event.
#[must_use]
pub fn event_line_items_prefix(event_id: &EventId) -> Vec<u8> {
    event_id.to_bytes().to_vec()
}

/// Create a bucket-line-item index key.
///
/// Format: `bucket_id (16) || event_id (16) || line_item_id (16)`
#[must_use]
pub fn bucket_line_item_key(
    bucket_id: &BucketId,
    event_id: &EventId,
    line_item_id: &LineItemId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(48);
    key.extend_from_slice(bucket_id.as_bytes());
    key.extend_from_slice(&line_item_key(event_id, line_item_id));
    key
}

/// The `line_items` key embedded in a bucket-line-item index key.
#[must_use]
pub fn line_item_key_from_bucket_key(key: &[u8]) -> Option<&[u8]> {
    key.get(16..48)
}

/// Create a prefix for iterating all entries of an account or bucket index.
#[must_use]
pub fn id_prefix(id: &[u8; 16]) -> Vec<u8> {
    id.to_vec()
}

#[allow(clippy::cast_sign_loss)]
fn ordered_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

#[allow(clippy::cast_sign_loss)]
fn ordered_i32(value: i32) -> [u8; 4] {
    ((value as u32) ^ (1 << 31)).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_event_key_orders_by_date() {
        let account = AccountId::generate();
        let early = account_event_key(
            &account,
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            &EventId::generate(),
        );
        let late = account_event_key(
            &account,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &EventId::generate(),
        );
        assert!(early < late);
        assert_eq!(early.len(), 36);
    }

    #[test]
    fn signed_components_sort_numerically() {
        assert!(ordered_i64(-5) < ordered_i64(3));
        assert!(ordered_i32(-1) < ordered_i32(0));
    }

    #[test]
    fn extract_ids_from_index_keys() {
        let account = AccountId::generate();
        let bucket = BucketId::generate();
        let event = EventId::generate();

        let key = account_bucket_key(&account, Utc::now(), &bucket);
        assert_eq!(extract_bucket_id(&key), Some(bucket));

        let key = account_event_key(&account, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(), &event);
        assert_eq!(extract_event_id(&key), Some(event));
        assert_eq!(extract_event_id(&key[..10]), None);
    }

    #[test]
    fn bucket_line_item_key_embeds_line_item_key() {
        let bucket = BucketId::generate();
        let event = EventId::generate();
        let item = LineItemId::generate();
        let key = bucket_line_item_key(&bucket, &event, &item);
        assert_eq!(
            line_item_key_from_bucket_key(&key),
            Some(line_item_key(&event, &item).as_slice())
        );
    }
}
