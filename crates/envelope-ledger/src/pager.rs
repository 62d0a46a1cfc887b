//! Ledger pager: an account's history, newest first.

use serde::Serialize;

use envelope_core::{Account, AccountItem, LedgerError, Result};
use envelope_store::Store;

use crate::config::LedgerConfig;

/// One page of an account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Whether a later page has at least one item.
    pub has_more: bool,

    /// The events on this page, most recent `occurred_on` first.
    pub items: Vec<AccountItem>,
}

/// Reads an account's events page by page.
pub struct LedgerPager<'a> {
    store: &'a dyn Store,
    config: &'a LedgerConfig,
}

impl<'a> LedgerPager<'a> {
    pub(crate) fn new(store: &'a dyn Store, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Fetch page `page_index` (zero-based) of `page_size` events.
    ///
    /// One extra record is requested to learn whether another page follows.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidArgument` if `page_size` is zero or the offset overflows.
    /// - `LedgerError::Persistence` if the store fails.
    pub fn page(&self, account: &Account, page_index: usize, page_size: usize) -> Result<Page> {
        if page_size == 0 {
            return Err(LedgerError::InvalidArgument(
                "page size must be positive".into(),
            ));
        }
        let offset = page_index.checked_mul(page_size).ok_or_else(|| {
            LedgerError::InvalidArgument(format!(
                "page {page_index} of size {page_size} is out of range"
            ))
        })?;

        let mut items = self
            .store
            .list_account_items(&account.id, page_size.saturating_add(1), offset)?;

        let has_more = items.len() > page_size;
        items.truncate(page_size);

        tracing::trace!(
            account_id = %account.id,
            page_index,
            page_size,
            returned = items.len(),
            has_more,
            "Ledger page read"
        );
        Ok(Page { has_more, items })
    }

    /// [`page`](Self::page) with the configured page size.
    ///
    /// # Errors
    ///
    /// See [`page`](Self::page).
    pub fn page_default(&self, account: &Account, page_index: usize) -> Result<Page> {
        self.page(account, page_index, self.config.default_page_size)
    }
}
