//! Ledger pager integration tests.

mod common;

use chrono::Days;
use common::{date, TestHarness};
use envelope_core::{Account, LedgerError, Posting};

fn post_events(harness: &TestHarness, account: &Account, count: u64) {
    let general = harness.ledger.buckets(account).default_bucket().unwrap().unwrap();
    for n in 0..count {
        let occurred_on = date(2024, 1, 1) + Days::new(n);
        harness
            .ledger
            .recorder()
            .post_transaction(
                account,
                occurred_on,
                "Deposit",
                harness.user_id,
                &[Posting::deposit(general.id, 1)],
            )
            .unwrap();
    }
}

#[test]
fn pages_split_history_newest_first() {
    let harness = TestHarness::new();
    let account = harness.open_account();
    post_events(&harness, &account, 150);
    let pager = harness.ledger.pager();

    let first = pager.page_default(&account, 0).unwrap();
    assert!(first.has_more);
    assert_eq!(first.items.len(), 100);
    assert_eq!(first.items[0].event.occurred_on, date(2024, 1, 1) + Days::new(149));
    assert!(first
        .items
        .windows(2)
        .all(|pair| pair[0].event.occurred_on >= pair[1].event.occurred_on));

    let second = pager.page_default(&account, 1).unwrap();
    assert!(!second.has_more);
    assert_eq!(second.items.len(), 50);
    assert_eq!(second.items[49].event.occurred_on, date(2024, 1, 1));

    let beyond = pager.page_default(&account, 2).unwrap();
    assert!(!beyond.has_more);
    assert!(beyond.items.is_empty());
}

#[test]
fn exact_page_has_no_more() {
    let harness = TestHarness::new();
    let account = harness.open_account();
    post_events(&harness, &account, 10);

    let page = harness.ledger.pager().page(&account, 0, 10).unwrap();
    assert!(!page.has_more);
    assert_eq!(page.items.len(), 10);

    let page = harness.ledger.pager().page(&account, 0, 9).unwrap();
    assert!(page.has_more);
}

#[test]
fn same_day_events_are_ordered_newest_first() {
    let harness = TestHarness::new();
    let account = harness.open_account();
    let general = harness.ledger.buckets(&account).default_bucket().unwrap().unwrap();
    let recorder = harness.ledger.recorder();

    // Posted back to back, most land in the same millisecond.
    let mut created = Vec::new();
    for amount in 1..=20 {
        let event = recorder
            .post_transaction(
                &account,
                date(2024, 5, 5),
                "Same day",
                harness.user_id,
                &[Posting::deposit(general.id, amount)],
            )
            .unwrap();
        created.push(event.id);
    }
    created.reverse();

    let page = harness.ledger.pager().page_default(&account, 0).unwrap();
    let listed: Vec<_> = page.items.iter().map(|item| item.event.id).collect();
    assert_eq!(listed, created);

    let amounts: Vec<i64> = page.items.iter().map(|item| item.amount_cents()).collect();
    assert_eq!(amounts, (1..=20).rev().collect::<Vec<i64>>());
}

#[test]
fn zero_page_size_is_rejected() {
    let harness = TestHarness::new();
    let account = harness.open_account();

    assert!(matches!(
        harness.ledger.pager().page(&account, 0, 0),
        Err(LedgerError::InvalidArgument(_))
    ));
    assert!(matches!(
        harness.ledger.pager().page(&account, usize::MAX, 2),
        Err(LedgerError::InvalidArgument(_))
    ));
}

#[test]
fn empty_account_has_empty_first_page() {
    let harness = TestHarness::new();
    let account = harness.open_account();

    let page = harness.ledger.pager().page_default(&account, 0).unwrap();
    assert!(!page.has_more);
    assert!(page.items.is_empty());
}
