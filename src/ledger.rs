// Balance ledger
//
// One fixed-point currency balance per account, mutated only while the
// account's row lock is held. Every multi-step settlement (trade, wager
// resolution, prediction payout) acquires the locks it needs, performs all
// reads and writes, then releases; partial application is never observable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::error::EngineError;
use crate::models::{quantize, AccountId};

/// A single account row. Only reachable through [`Ledger::lock_account`],
/// so holding `&mut Account` proves the row lock is held.
#[derive(Debug)]
pub struct Account {
    pub id: AccountId,
    balance: Decimal,
}

impl Account {
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Apply a signed delta to the balance.
    ///
    /// The delta is rounded to the ledger scale before it is applied. Fails
    /// with `InsufficientFunds` if the resulting balance would be negative;
    /// the balance is untouched on failure.
    pub fn adjust(&mut self, delta: Decimal) -> Result<Decimal, EngineError> {
        let delta = quantize(delta);
        let next = self.balance + delta;
        if next < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                needed: -delta,
                available: self.balance,
            });
        }
        self.balance = next;
        Ok(self.balance)
    }
}

/// Registry of account rows.
///
/// The outer map lock is only held long enough to clone a row handle; row
/// locks are independent, so settlements on unrelated accounts proceed fully
/// in parallel.
pub struct Ledger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Register an account with an initial balance. No-op if it exists.
    pub fn open_account(&self, id: AccountId, initial: Decimal) {
        let mut accounts = self.accounts.write().expect("ledger map poisoned");
        accounts.entry(id).or_insert_with(|| {
            info!(account = id, balance = %initial, "account opened");
            Arc::new(Mutex::new(Account {
                id,
                balance: quantize(initial),
            }))
        });
    }

    fn row(&self, id: AccountId) -> Result<Arc<Mutex<Account>>, EngineError> {
        let accounts = self.accounts.read().expect("ledger map poisoned");
        accounts
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownAccount(id))
    }

    /// Acquire the exclusive row lock for `id` for the duration of a
    /// settlement transaction. The guard is owned, so it can be held across
    /// await points while other rows stay unlocked.
    pub async fn lock_account(
        &self,
        id: AccountId,
    ) -> Result<OwnedMutexGuard<Account>, EngineError> {
        Ok(self.row(id)?.lock_owned().await)
    }

    /// Lock, adjust, unlock. For single-account settlements.
    pub async fn adjust(&self, id: AccountId, delta: Decimal) -> Result<Decimal, EngineError> {
        let mut account = self.lock_account(id).await?;
        account.adjust(delta)
    }

    /// Current balance snapshot (racy by nature; for display and quotes only).
    pub async fn balance(&self, id: AccountId) -> Result<Decimal, EngineError> {
        let account = self.lock_account(id).await?;
        Ok(account.balance())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn adjust_applies_delta() {
        let ledger = Ledger::new();
        ledger.open_account(1, dec!(1000));

        assert_eq!(ledger.adjust(1, dec!(-100)).await.unwrap(), dec!(900));
        assert_eq!(ledger.adjust(1, dec!(50.5)).await.unwrap(), dec!(950.5));
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(950.5));
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_side_effects() {
        let ledger = Ledger::new();
        ledger.open_account(1, dec!(10));

        let err = ledger.adjust(1, dec!(-10.00000001)).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(10));

        // draining to exactly zero is fine
        assert_eq!(ledger.adjust(1, dec!(-10)).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn unknown_account_is_an_error() {
        let ledger = Ledger::new();
        assert!(matches!(
            ledger.adjust(42, dec!(1)).await.unwrap_err(),
            EngineError::UnknownAccount(42)
        ));
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(Ledger::new());
        ledger.open_account(1, dec!(100));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.adjust(1, dec!(-30)).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        // 100 / 30 => exactly three debits can succeed
        assert_eq!(succeeded, 3);
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn open_account_is_idempotent() {
        let ledger = Ledger::new();
        ledger.open_account(1, dec!(100));
        ledger.adjust(1, dec!(-40)).await.unwrap();
        ledger.open_account(1, dec!(100));
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(60));
    }
}
