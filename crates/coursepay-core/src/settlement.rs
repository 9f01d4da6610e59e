//! Settlement ledger and hold state machines.
//!
//! One [`SettlementLedger`] row is created per settleable order line,
//! recording the instructor's share of the sale. One [`SettlementHold`]
//! guards it for the duration of the refund window:
//!
//! ```text
//! [commit] -> hold Held, ledger ineligible
//! Held --release (window elapsed, no refund)--> Released, ledger eligible
//! Held --cancel  (refund approved in window)--> Cancelled, ledger blocked
//! ledger: eligible --settle()--> settled (terminal, exactly once)
//! ```
//!
//! All transitions are one-way. A refund arriving after settlement is
//! rejected (`ConflictError::AlreadySettled`); clawback is a separate
//! process, never a mutation of a settled row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConflictError, IntegrityError};
use crate::ids::{HoldId, InstructorId, LedgerId, OrderId, OrderItemId, UserId};
use crate::money::fee_split;

/// Revenue share owed to an instructor for one order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementLedger {
    /// Ledger row ID (ULID).
    pub id: LedgerId,

    /// The instructor this revenue belongs to.
    pub instructor_id: InstructorId,

    /// The order that produced this row.
    pub order_id: OrderId,

    /// The order line, when the row is item-scoped.
    pub order_item_id: Option<OrderItemId>,

    /// Instructor share, in minor units.
    pub net_amount: i64,

    /// Platform cut, in minor units.
    pub fee_amount: i64,

    /// Fee rate in basis points, frozen at creation. Never recomputed from
    /// a current fee schedule; past sales keep their historical rate.
    pub rate_bps: u32,

    /// Whether the row may be paid out.
    pub eligible: bool,

    /// Set when a refund permanently blocked this row.
    pub blocked_at: Option<DateTime<Utc>>,

    /// When the row was paid out. Terminal once set.
    pub settled_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl SettlementLedger {
    /// Create an ineligible ledger row, splitting `gross` at `rate_bps`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::NegativeAmount`] if `gross` is negative.
    pub fn create(
        instructor_id: InstructorId,
        order_id: OrderId,
        order_item_id: Option<OrderItemId>,
        gross: i64,
        rate_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, IntegrityError> {
        let (net_amount, fee_amount) = fee_split(gross, rate_bps)?;
        Ok(Self {
            id: LedgerId::generate(),
            instructor_id,
            order_id,
            order_item_id,
            net_amount,
            fee_amount,
            rate_bps,
            eligible: false,
            blocked_at: None,
            settled_at: None,
            created_at: now,
        })
    }

    /// Gross amount this row accounts for. Immutable after creation.
    #[must_use]
    pub const fn total_amount(&self) -> i64 {
        self.net_amount + self.fee_amount
    }

    /// Verify the `net + fee == total` invariant against an expected gross.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::AmountSplitMismatch`] on violation.
    pub fn verify_split(&self, expected_gross: i64) -> Result<(), IntegrityError> {
        if self.total_amount() != expected_gross {
            return Err(IntegrityError::AmountSplitMismatch {
                net: self.net_amount,
                fee: self.fee_amount,
                total: expected_gross,
            });
        }
        Ok(())
    }

    /// Flip the row to eligible after its hold released cleanly.
    ///
    /// Re-marking an already-eligible row is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the row was blocked by a refund or already settled.
    pub fn mark_eligible(&mut self) -> Result<(), ConflictError> {
        if self.settled_at.is_some() {
            return Err(ConflictError::AlreadySettled(self.id));
        }
        if self.blocked_at.is_some() {
            return Err(ConflictError::LedgerBlocked(self.id));
        }
        self.eligible = true;
        Ok(())
    }

    /// Permanently block the row after a refund.
    ///
    /// # Errors
    ///
    /// Fails with [`ConflictError::AlreadySettled`] if the row was already
    /// settled; `settled_at` is never cleared.
    pub fn mark_ineligible(&mut self, now: DateTime<Utc>) -> Result<(), ConflictError> {
        if self.settled_at.is_some() {
            return Err(ConflictError::AlreadySettled(self.id));
        }
        self.eligible = false;
        self.blocked_at = Some(now);
        Ok(())
    }

    /// Pay the row out. One-shot: only from eligible-and-unsettled.
    ///
    /// # Errors
    ///
    /// - [`SettleError::Conflict`] with `AlreadySettled` if `settled_at` is
    ///   already set (double-payout guard).
    /// - [`SettleError::Integrity`] with `SettleIneligible` if the row is
    ///   not eligible.
    pub fn settle(&mut self, now: DateTime<Utc>) -> Result<(), SettleError> {
        if self.settled_at.is_some() {
            return Err(ConflictError::AlreadySettled(self.id).into());
        }
        if !self.eligible {
            return Err(IntegrityError::SettleIneligible(self.id).into());
        }
        self.settled_at = Some(now);
        Ok(())
    }
}

/// Failure settling a ledger row.
///
/// Double-settle attempts are conflicts (a concurrent batch won); settling
/// an ineligible row is an integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    /// Lost a concurrent transition.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// An accounting invariant was violated.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Status of a settlement hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Waiting out the refund window.
    Held,

    /// Window elapsed without a refund; the ledger became eligible.
    Released,

    /// A refund was approved inside the window; the ledger is blocked.
    Cancelled,
}

/// Refund-window guard for one order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementHold {
    /// Hold ID (ULID).
    pub id: HoldId,

    /// The order line this hold guards.
    pub order_item_id: OrderItemId,

    /// The purchasing user (refund requests arrive keyed by user).
    pub user_id: UserId,

    /// Absolute time the refund window closes.
    pub hold_until: DateTime<Utc>,

    /// Current status. Transitions are one-way from `Held`.
    pub status: HoldStatus,

    /// When the hold was created.
    pub created_at: DateTime<Utc>,

    /// When the hold was released, if it was.
    pub released_at: Option<DateTime<Utc>>,

    /// When the hold was cancelled, if it was.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl SettlementHold {
    /// Create a hold covering the refund window for one order line.
    #[must_use]
    pub fn create(
        order_item_id: OrderItemId,
        user_id: UserId,
        hold_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HoldId::generate(),
            order_item_id,
            user_id,
            hold_until,
            status: HoldStatus::Held,
            created_at: now,
            released_at: None,
            cancelled_at: None,
        }
    }

    /// Whether the refund window has elapsed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Held && now >= self.hold_until
    }

    /// Release the hold: the window elapsed with no refund.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::StaleHold`] if the hold already left `Held`.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), ConflictError> {
        if self.status != HoldStatus::Held {
            return Err(ConflictError::StaleHold { status: self.status });
        }
        self.status = HoldStatus::Released;
        self.released_at = Some(now);
        Ok(())
    }

    /// Cancel the hold: a refund was approved inside the window.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::StaleHold`] if the hold already left `Held`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ConflictError> {
        if self.status != HoldStatus::Held {
            return Err(ConflictError::StaleHold { status: self.status });
        }
        self.status = HoldStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ledger(gross: i64) -> SettlementLedger {
        SettlementLedger::create(
            InstructorId::generate(),
            OrderId::generate(),
            Some(OrderItemId::generate()),
            gross,
            3_000,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn split_preserves_total() {
        let row = ledger(50_000);
        assert_eq!(row.net_amount + row.fee_amount, 50_000);
        assert_eq!(row.total_amount(), 50_000);
        row.verify_split(50_000).unwrap();
        assert!(row.verify_split(50_001).is_err());
    }

    #[test]
    fn created_ineligible_and_unsettled() {
        let row = ledger(10_000);
        assert!(!row.eligible);
        assert!(row.settled_at.is_none());
        assert!(row.blocked_at.is_none());
    }

    #[test]
    fn settle_requires_eligibility() {
        let mut row = ledger(10_000);
        let err = row.settle(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SettleError::Integrity(IntegrityError::SettleIneligible(_))
        ));

        row.mark_eligible().unwrap();
        row.settle(Utc::now()).unwrap();
        assert!(row.settled_at.is_some());
    }

    #[test]
    fn settle_is_one_shot() {
        let mut row = ledger(10_000);
        row.mark_eligible().unwrap();
        let first = Utc::now();
        row.settle(first).unwrap();

        let err = row.settle(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SettleError::Conflict(ConflictError::AlreadySettled(_))
        ));
        // settled_at untouched by the rejected second call
        assert_eq!(row.settled_at, Some(first));
    }

    #[test]
    fn refund_block_is_permanent() {
        let mut row = ledger(10_000);
        row.mark_ineligible(Utc::now()).unwrap();

        let err = row.mark_eligible().unwrap_err();
        assert!(matches!(err, ConflictError::LedgerBlocked(_)));
        assert!(!row.eligible);
    }

    #[test]
    fn refund_after_settlement_rejected() {
        let mut row = ledger(10_000);
        row.mark_eligible().unwrap();
        let settled = Utc::now();
        row.settle(settled).unwrap();

        let err = row.mark_ineligible(Utc::now()).unwrap_err();
        assert!(matches!(err, ConflictError::AlreadySettled(_)));
        // settlement is terminal, never cleared
        assert_eq!(row.settled_at, Some(settled));
    }

    #[test]
    fn refund_can_block_an_eligible_unsettled_row() {
        let mut row = ledger(10_000);
        row.mark_eligible().unwrap();
        row.mark_ineligible(Utc::now()).unwrap();
        assert!(!row.eligible);
        assert!(row.settle(Utc::now()).is_err());
    }

    fn hold(window: Duration) -> SettlementHold {
        let now = Utc::now();
        SettlementHold::create(
            OrderItemId::generate(),
            UserId::generate(),
            now + window,
            now,
        )
    }

    #[test]
    fn hold_due_only_after_window() {
        let h = hold(Duration::hours(1));
        assert!(!h.is_due(Utc::now()));
        assert!(h.is_due(Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn release_then_cancel_is_stale() {
        let mut h = hold(Duration::zero());
        h.release(Utc::now()).unwrap();
        assert_eq!(h.status, HoldStatus::Released);

        let err = h.cancel(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ConflictError::StaleHold { status: HoldStatus::Released }
        );
    }

    #[test]
    fn cancel_then_release_is_stale() {
        let mut h = hold(Duration::hours(1));
        h.cancel(Utc::now()).unwrap();
        assert_eq!(h.status, HoldStatus::Cancelled);

        let err = h.release(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ConflictError::StaleHold { status: HoldStatus::Cancelled }
        );
    }
}
