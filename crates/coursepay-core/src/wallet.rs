//! Cookie wallet batch ledger.
//!
//! Every credit grant (purchase, admin bonus, promotion) appends one
//! [`CookieBatch`]; batches are never merged or deleted, only debited and
//! soft-expired, keeping the wallet auditable as an append-only ledger.
//!
//! Spends consume batches in two-tier FIFO order: free credit before paid
//! credit; within free, soonest expiry first (non-expiring last); within
//! paid, strictly acquisition order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IntegrityError;
use crate::ids::{BatchId, UserId};

/// Whether the credit was granted free or purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieType {
    /// Granted credit (bonus, promotion). Spent first.
    Free,

    /// Purchased credit. Spent in acquisition order after free credit.
    Paid,
}

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    /// Purchased through a cookie bundle order.
    Purchase,

    /// Granted by an operator.
    Admin,

    /// Granted by a promotion campaign.
    Promotion,
}

/// One grant of cookie credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieBatch {
    /// Batch ID (ULID, time-ordered).
    pub id: BatchId,

    /// The owning user's wallet.
    pub user_id: UserId,

    /// Free or paid credit tier.
    pub cookie_type: CookieType,

    /// How the batch was granted.
    pub source: BatchSource,

    /// Quantity originally granted.
    pub qty_total: i64,

    /// Quantity still spendable. Only ever decreases.
    pub qty_remain: i64,

    /// Expiry, if the grant expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// Soft-delete flag; expired batches are deactivated, not removed.
    pub is_active: bool,

    /// When the batch was granted.
    pub created_at: DateTime<Utc>,
}

impl CookieBatch {
    /// Grant a new batch.
    #[must_use]
    pub fn grant(
        user_id: UserId,
        cookie_type: CookieType,
        source: BatchSource,
        qty: i64,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::generate(),
            user_id,
            cookie_type,
            source,
            qty_total: qty,
            qty_remain: qty,
            expires_at,
            is_active: true,
            created_at: now,
        }
    }

    /// Whether the batch has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether new debits may select this batch.
    #[must_use]
    pub fn is_spendable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.qty_remain > 0 && !self.is_expired(now)
    }

    /// Debit up to `amount` from this batch, returning the quantity taken.
    ///
    /// Callers pass the still-outstanding spend amount; the batch gives
    /// `min(amount, qty_remain)`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::NegativeAmount`] for a negative request.
    pub fn take(&mut self, amount: i64) -> Result<i64, IntegrityError> {
        if amount < 0 {
            return Err(IntegrityError::NegativeAmount(amount));
        }
        let taken = amount.min(self.qty_remain);
        self.qty_remain -= taken;
        Ok(taken)
    }

    /// Debit exactly `amount`, failing loudly if the batch cannot cover it.
    ///
    /// Used when replaying a precomputed debit plan; a shortfall here means
    /// the plan was computed against stale state.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::BatchOverdraw`] if `amount > qty_remain`.
    pub fn take_exact(&mut self, amount: i64) -> Result<(), IntegrityError> {
        if amount < 0 {
            return Err(IntegrityError::NegativeAmount(amount));
        }
        if amount > self.qty_remain {
            return Err(IntegrityError::BatchOverdraw {
                batch: self.id,
                requested: amount,
                remaining: self.qty_remain,
            });
        }
        self.qty_remain -= amount;
        Ok(())
    }

    /// Soft-expire the batch. Remaining quantity becomes unspendable and is
    /// not moved anywhere (use-it-or-lose-it).
    pub fn expire(&mut self) {
        self.is_active = false;
    }
}

/// Two-tier FIFO spend ordering.
///
/// Free before paid; within free, soonest `expires_at` first with
/// non-expiring batches last; ties (and all paid batches) by `created_at`
/// ascending, then by ID for total order.
#[must_use]
pub fn spend_order(a: &CookieBatch, b: &CookieBatch) -> Ordering {
    let tier = |batch: &CookieBatch| match batch.cookie_type {
        CookieType::Free => 0u8,
        CookieType::Paid => 1,
    };
    tier(a)
        .cmp(&tier(b))
        .then_with(|| match (a.cookie_type, a.expires_at, b.expires_at) {
            // Expiry only orders the free tier; paid credit is strict FIFO.
            (CookieType::Free, Some(x), Some(y)) => x.cmp(&y),
            (CookieType::Free, Some(_), None) => Ordering::Less,
            (CookieType::Free, None, Some(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.to_bytes().cmp(&b.id.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(
        cookie_type: CookieType,
        qty: i64,
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> CookieBatch {
        let mut b = CookieBatch::grant(
            UserId::generate(),
            cookie_type,
            BatchSource::Admin,
            qty,
            expires_at,
            created_at,
        );
        b.created_at = created_at;
        b
    }

    #[test]
    fn take_is_partial_and_monotonic() {
        let now = Utc::now();
        let mut b = batch(CookieType::Paid, 10, None, now);

        assert_eq!(b.take(3).unwrap(), 3);
        assert_eq!(b.qty_remain, 7);
        assert_eq!(b.take(100).unwrap(), 7);
        assert_eq!(b.qty_remain, 0);
        assert!(!b.is_spendable(now));
        assert!(b.qty_remain >= 0 && b.qty_remain <= b.qty_total);
    }

    #[test]
    fn take_exact_overdraw_fails_loudly() {
        let now = Utc::now();
        let mut b = batch(CookieType::Paid, 5, None, now);
        let err = b.take_exact(6).unwrap_err();
        assert!(matches!(err, IntegrityError::BatchOverdraw { requested: 6, remaining: 5, .. }));
        // nothing taken on failure
        assert_eq!(b.qty_remain, 5);
    }

    #[test]
    fn expired_batches_are_not_spendable() {
        let now = Utc::now();
        let b = batch(CookieType::Free, 5, Some(now - Duration::hours(1)), now);
        assert!(b.is_expired(now));
        assert!(!b.is_spendable(now));
    }

    #[test]
    fn soft_expire_forfeits_remainder() {
        let now = Utc::now();
        let mut b = batch(CookieType::Free, 5, Some(now), now);
        b.expire();
        assert!(!b.is_active);
        assert_eq!(b.qty_remain, 5); // remainder stays recorded, unspendable
        assert!(!b.is_spendable(now + Duration::hours(1)));
    }

    #[test]
    fn free_spends_before_paid() {
        let now = Utc::now();
        // paid batch created earlier than the free one
        let paid = batch(CookieType::Paid, 10, None, now - Duration::days(2));
        let free = batch(CookieType::Free, 5, Some(now + Duration::days(1)), now);
        assert_eq!(spend_order(&free, &paid), Ordering::Less);
    }

    #[test]
    fn free_tier_orders_by_soonest_expiry_nulls_last() {
        let now = Utc::now();
        let soon = batch(CookieType::Free, 1, Some(now + Duration::days(1)), now);
        let later = batch(CookieType::Free, 1, Some(now + Duration::days(7)), now);
        let never = batch(CookieType::Free, 1, None, now - Duration::days(1));

        assert_eq!(spend_order(&soon, &later), Ordering::Less);
        assert_eq!(spend_order(&later, &never), Ordering::Less);
        assert_eq!(spend_order(&never, &soon), Ordering::Greater);
    }

    #[test]
    fn paid_tier_is_strict_acquisition_order() {
        let now = Utc::now();
        // an expiring paid batch does not jump the queue
        let older = batch(CookieType::Paid, 1, None, now - Duration::days(3));
        let newer_expiring = batch(CookieType::Paid, 1, Some(now + Duration::hours(1)), now);
        assert_eq!(spend_order(&older, &newer_expiring), Ordering::Less);
    }
}
