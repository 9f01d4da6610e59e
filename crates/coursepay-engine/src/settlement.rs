//! Settlement services: the refund-window sweep, refunds, and payouts.

use std::sync::Arc;

use coursepay_core::{
    ConflictError, InstructorId, LedgerId, OrderItemId, SettlementHold, SettlementLedger,
    ValidationError,
};
use coursepay_store::{InstructorSummary, Store, StoreError};

use crate::collaborators::Clock;
use crate::error::{EngineError, Result};

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Holds released and their ledgers made eligible.
    pub released: u64,

    /// Holds that left `Held` between listing and transition. Skipped;
    /// a concurrent refund or a previous sweep got there first.
    pub stale: u64,
}

/// Refund-window and payout operations over the settlement ledger.
pub struct SettlementService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SettlementService {
    /// Create a settlement service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Release up to `limit` holds whose refund window has elapsed, making
    /// their ledger rows eligible for payout.
    ///
    /// Safe to run repeatedly and concurrently: a hold that already left
    /// `Held` is counted as stale and skipped, never re-transitioned.
    ///
    /// # Errors
    ///
    /// Returns the first non-staleness failure.
    pub fn release_due_holds(&self, limit: usize) -> Result<SweepStats> {
        let now = self.clock.now();
        let mut stats = SweepStats::default();

        for hold in self.store.list_due_holds(now, limit)? {
            match self.store.release_hold(&hold.id, now) {
                Ok(_) => stats.released += 1,
                Err(StoreError::Conflict(ConflictError::StaleHold { status })) => {
                    tracing::debug!(hold_id = %hold.id, ?status, "sweep skipped stale hold");
                    stats.stale += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if stats.released > 0 || stats.stale > 0 {
            tracing::info!(released = stats.released, stale = stats.stale, "hold sweep pass");
        }
        Ok(stats)
    }

    /// Approve a refund for one order item, inside its refund window.
    ///
    /// Cancels the hold and permanently blocks the ledger row in one atomic
    /// transition.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::RefundWindowClosed`] when the window elapsed.
    /// - [`ConflictError::StaleHold`] when the sweep released the hold
    ///   first (including any refund arriving after settlement).
    pub fn cancel_for_refund(&self, order_item_id: &OrderItemId) -> Result<SettlementHold> {
        let now = self.clock.now();
        let hold = self
            .store
            .find_hold_by_item(order_item_id)?
            .ok_or_else(|| {
                EngineError::Store(StoreError::NotFound {
                    entity: "hold for order item",
                    id: order_item_id.to_string(),
                })
            })?;

        if now >= hold.hold_until {
            return Err(ValidationError::RefundWindowClosed {
                closed_at: hold.hold_until,
            }
            .into());
        }

        Ok(self.store.cancel_hold(&hold.id, now)?)
    }

    /// Pay out one eligible ledger row, exactly once.
    ///
    /// # Errors
    ///
    /// - [`ConflictError::AlreadySettled`] on a double payout.
    /// - `IntegrityError::SettleIneligible` when the row is not eligible.
    pub fn settle(&self, ledger_id: &LedgerId) -> Result<SettlementLedger> {
        Ok(self.store.settle_ledger(ledger_id, self.clock.now())?)
    }

    /// An instructor's ledger rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn ledgers_for_instructor(
        &self,
        instructor_id: &InstructorId,
    ) -> Result<Vec<SettlementLedger>> {
        Ok(self.store.list_ledgers_by_instructor(instructor_id)?)
    }

    /// Aggregate net sums for an instructor's dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn instructor_summary(&self, instructor_id: &InstructorId) -> Result<InstructorSummary> {
        Ok(self.store.instructor_summary(instructor_id)?)
    }
}
