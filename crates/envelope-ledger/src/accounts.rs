//! Account creation and lookup.
//!
//! Opening an account runs `created -> default bucket created -> starting
//! balance posted -> ready` as a single store write, so no reader ever sees
//! an account without its default bucket or without its opening deposit.

use envelope_core::{Account, AccountId, BucketRecord, BucketRole, LedgerError, NewAccount, Result};

use crate::recorder::TransactionRecorder;
use crate::Ledger;

impl Ledger {
    /// Open an account with its default bucket and optional starting balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Persistence` if the write fails; nothing is created.
    pub fn create_account(&self, new_account: NewAccount) -> Result<Account> {
        let account = Account::new(new_account.subscription_id, new_account.author_id);
        let default_bucket = BucketRecord::new(
            account.id,
            self.config.default_bucket_name.clone(),
            BucketRole::Default,
            account.author_id,
        );
        let opening = TransactionRecorder::starting_balance_batch(
            &account,
            &default_bucket,
            new_account.starting_balance.as_ref(),
        )?;

        self.store
            .create_account(&account, &default_bucket, opening.as_ref())?;
        self.balances.invalidate(&account.id)?;

        tracing::info!(
            account_id = %account.id,
            subscription_id = %account.subscription_id,
            default_bucket_id = %default_bucket.id,
            starting_balance_cents = opening.as_ref().map_or(0, |batch| batch.total_cents()),
            "Account created"
        );
        Ok(account)
    }

    /// Look an account up by ID.
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotFound` if the account doesn't exist.
    /// - `LedgerError::Persistence` if the store fails.
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        self.store
            .get_account(account_id)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })
    }
}
