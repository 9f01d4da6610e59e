//! Cookie wallet facade.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use coursepay_core::{BatchId, BatchSource, CookieBatch, CookieType, IntegrityError, UserId};
use coursepay_store::Store;

use crate::collaborators::Clock;
use crate::error::Result;

/// User-facing wallet operations over the batch ledger.
pub struct CookieWallet {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CookieWallet {
    /// Create a wallet facade.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Spendable balance: the sum over active, unexpired batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn balance(&self, user_id: &UserId) -> Result<i64> {
        Ok(self.store.cookie_balance(user_id, self.clock.now())?)
    }

    /// Grant credit as a new batch. Grants always append; they never merge
    /// into an existing batch.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::NegativeAmount`] for a non-positive grant.
    pub fn credit(
        &self,
        user_id: UserId,
        cookie_type: CookieType,
        source: BatchSource,
        qty: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CookieBatch> {
        if qty <= 0 {
            return Err(IntegrityError::NegativeAmount(qty).into());
        }
        let batch = CookieBatch::grant(user_id, cookie_type, source, qty, expires_at, self.clock.now());
        self.store.put_batch(&batch)?;
        tracing::info!(
            batch_id = %batch.id,
            user_id = %user_id,
            qty,
            cookie_type = ?cookie_type,
            source = ?source,
            "cookie batch granted"
        );
        Ok(batch)
    }

    /// Debit `amount` in FIFO order. All-or-nothing: an insufficient
    /// balance debits nothing.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InsufficientCookies` on a shortfall.
    pub fn debit(&self, user_id: &UserId, amount: i64) -> Result<Vec<(BatchId, i64)>> {
        Ok(self.store.debit_batches(user_id, amount, self.clock.now())?)
    }

    /// A user's full batch history, including spent and expired batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn history(&self, user_id: &UserId) -> Result<Vec<CookieBatch>> {
        Ok(self.store.list_batches_by_user(user_id)?)
    }

    /// Soft-expire every batch past its expiry. The remainder is forfeited,
    /// not moved. Returns the number of batches deactivated.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep fails.
    pub fn sweep_expired(&self) -> Result<u64> {
        let count = self.store.sweep_expired_batches(self.clock.now())?;
        if count > 0 {
            tracing::info!(count, "expired cookie batches deactivated");
        }
        Ok(count)
    }
}
