//! `RocksDB` storage layer for the coursepay settlement engine.
//!
//! This crate persists orders, settlement ledgers/holds, cookie wallet
//! batches, daily spend aggregates, and coupons using `RocksDB` column
//! families (see [`schema`]) with CBOR-encoded values.
//!
//! # Atomicity
//!
//! Everything the payment pipeline mutates goes through compound operations
//! on the [`Store`] trait: each takes a striped per-entity lock, re-checks
//! its guard condition against current state, and commits one `WriteBatch`.
//! Losers of a concurrent transition get a conflict error instead of
//! overwriting the winner:
//!
//! - [`Store::commit_order`] — idempotency key re-check + FIFO wallet
//!   compare-and-decrement + all order/ledger/hold/coupon/aggregate writes.
//! - [`Store::release_hold`] / [`Store::cancel_hold`] — `status == Held`
//!   guard, hold transition and ledger eligibility flip in one batch.
//! - [`Store::settle_ledger`] — the `settled_at IS NULL` guard is atomic
//!   with the write.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, NaiveDate, Utc};

use coursepay_core::{
    BatchId, CookieBatch, Coupon, CouponId, CourseId, DailyLimitAggregate, HoldId, InstructorId,
    IssuedCoupon, IssuedCouponId, LedgerId, Order, OrderId, OrderItemId, SettlementHold,
    SettlementLedger, UserId,
};

/// Everything a validated payment commits in one atomic unit.
#[derive(Debug)]
pub struct OrderCommit {
    /// The assembled order (status `Paid`).
    pub order: Order,

    /// One ledger row per settleable line, created ineligible.
    pub ledgers: Vec<SettlementLedger>,

    /// One hold per settleable line, created `Held`.
    pub holds: Vec<SettlementHold>,

    /// Wallet debit for cookie orders; `0` for cash orders.
    pub wallet_debit: i64,

    /// Redeemed coupon state (template with `used_count` incremented, issue
    /// marked used), when a coupon was applied.
    pub coupon: Option<(Coupon, IssuedCoupon)>,

    /// Commit timestamp (drives the daily aggregate day and batch expiry).
    pub now: DateTime<Utc>,
}

/// Result of a committed order.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The committed order ID.
    pub order_id: OrderId,

    /// Human-facing order number.
    pub order_number: String,

    /// Wallet debit breakdown `(batch, quantity taken)`, FIFO order.
    /// Empty for cash orders.
    pub wallet_debits: Vec<(BatchId, i64)>,
}

/// Aggregate net sums for an instructor's dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstructorSummary {
    /// Net still inside the refund window (ineligible, unblocked).
    pub pending_net: i64,

    /// Net eligible for payout and not yet settled.
    pub eligible_net: i64,

    /// Net already paid out.
    pub settled_net: i64,

    /// Net permanently blocked by refunds.
    pub blocked_net: i64,
}

/// The storage trait defining all database operations.
pub trait Store: Send + Sync {
    // =========================================================================
    // Orders & idempotency
    // =========================================================================

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Find the order committed under an idempotency key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>>;

    /// Whether the user already bought this course in a paid order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_paid_purchase(&self, user_id: &UserId, course_id: &CourseId) -> Result<bool>;

    /// Commit a validated order atomically: order + idempotency reservation
    /// + purchase guards + ledgers + holds + wallet debit + coupon + daily
    /// aggregate, all in one write.
    ///
    /// The idempotency key, the purchase guards, and (for cookie orders)
    /// the wallet balance are re-checked under the user's lock; two
    /// concurrent commits with the same key cannot both succeed, and the
    /// same course cannot be sold to the same user twice.
    ///
    /// # Errors
    ///
    /// - `ConflictError::DuplicateRequest` if the key was committed first
    ///   by a concurrent request.
    /// - `ValidationError::AlreadyPurchased` if a concurrent order bought
    ///   one of the courses first.
    /// - `ValidationError::InsufficientCookies` if the wallet shrank below
    ///   the debit since validation.
    fn commit_order(&self, commit: OrderCommit) -> Result<CommitOutcome>;

    // =========================================================================
    // Cookie wallet
    // =========================================================================

    /// Append a credit batch (never merges with existing batches).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_batch(&self, batch: &CookieBatch) -> Result<()>;

    /// Get a batch by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_batch(&self, batch_id: &BatchId) -> Result<Option<CookieBatch>>;

    /// List all of a user's batches (including spent and expired ones),
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_batches_by_user(&self, user_id: &UserId) -> Result<Vec<CookieBatch>>;

    /// Sum of `qty_remain` over the user's spendable batches as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn cookie_balance(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<i64>;

    /// Debit `amount` across the user's batches in FIFO order, atomically.
    ///
    /// The balance check happens before any batch is mutated; there are no
    /// partial debits. Returns the `(batch, taken)` breakdown.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InsufficientCookies` if spendable balance
    /// is below `amount`.
    fn debit_batches(
        &self,
        user_id: &UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<(BatchId, i64)>>;

    /// Soft-expire every active batch with `expires_at <= now`. Returns the
    /// number of batches deactivated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn sweep_expired_batches(&self, now: DateTime<Utc>) -> Result<u64>;

    // =========================================================================
    // Settlement ledger
    // =========================================================================

    /// Get a ledger row by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ledger(&self, ledger_id: &LedgerId) -> Result<Option<SettlementLedger>>;

    /// List an instructor's ledger rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledgers_by_instructor(
        &self,
        instructor_id: &InstructorId,
    ) -> Result<Vec<SettlementLedger>>;

    /// Aggregate net sums for an instructor (read-only dashboard surface).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn instructor_summary(&self, instructor_id: &InstructorId) -> Result<InstructorSummary>;

    /// Settle a ledger row, exactly once. The eligible-and-unsettled guard
    /// is enforced atomically with the write.
    ///
    /// # Errors
    ///
    /// - `ConflictError::AlreadySettled` on a double-settle attempt.
    /// - `IntegrityError::SettleIneligible` when the row is not eligible.
    fn settle_ledger(&self, ledger_id: &LedgerId, now: DateTime<Utc>) -> Result<SettlementLedger>;

    // =========================================================================
    // Settlement holds
    // =========================================================================

    /// Get a hold by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_hold(&self, hold_id: &HoldId) -> Result<Option<SettlementHold>>;

    /// Find the hold guarding an order item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_hold_by_item(&self, order_item_id: &OrderItemId) -> Result<Option<SettlementHold>>;

    /// List up to `limit` holds still `Held` whose window has elapsed,
    /// soonest due first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_due_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SettlementHold>>;

    /// Release a hold (window elapsed, no refund) and flip its ledger to
    /// eligible, in one atomic batch guarded by `status == Held`.
    ///
    /// # Errors
    ///
    /// Returns `ConflictError::StaleHold` if the hold already left `Held`.
    fn release_hold(&self, hold_id: &HoldId, now: DateTime<Utc>) -> Result<SettlementHold>;

    /// Cancel a hold (refund approved in-window) and permanently block its
    /// ledger, in one atomic batch guarded by `status == Held`.
    ///
    /// # Errors
    ///
    /// - `ConflictError::StaleHold` if the hold already left `Held`.
    /// - `ConflictError::AlreadySettled` if the ledger was already settled.
    fn cancel_hold(&self, hold_id: &HoldId, now: DateTime<Utc>) -> Result<SettlementHold>;

    // =========================================================================
    // Daily limits
    // =========================================================================

    /// Get the user's spend aggregate for a calendar day, if any spend
    /// happened that day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_daily_limit(
        &self,
        user_id: &UserId,
        day: NaiveDate,
    ) -> Result<Option<DailyLimitAggregate>>;

    // =========================================================================
    // Coupons
    // =========================================================================

    /// Insert or update a coupon template.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_coupon(&self, coupon: &Coupon) -> Result<()>;

    /// Get a coupon template by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_coupon(&self, coupon_id: &CouponId) -> Result<Option<Coupon>>;

    /// Insert or update an issued coupon.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_issued_coupon(&self, issued: &IssuedCoupon) -> Result<()>;

    /// Get an issued coupon by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_issued_coupon(&self, issued_id: &IssuedCouponId) -> Result<Option<IssuedCoupon>>;
}
