//! Error taxonomy for the settlement and wallet engine.
//!
//! Three distinct families, kept separate so callers can tell a client
//! mistake from a lost race from a broken invariant:
//!
//! - [`ValidationError`] — client-fixable; every variant names the exact
//!   failing reason, never a generic "invalid request".
//! - [`ConflictError`] — lost a concurrent transition; the state changed
//!   under the caller and the operation should be re-read, not retried
//!   blindly.
//! - [`IntegrityError`] — an accounting invariant was violated. Fatal;
//!   never auto-corrected.

use crate::ids::{BatchId, CourseId, LedgerId, UserId};
use crate::settlement::HoldStatus;

/// Client-fixable validation failures.
///
/// The payment pipeline surfaces these verbatim so the caller can show an
/// actionable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The requesting user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// A requested course does not exist.
    #[error("course not found: {0}")]
    CourseNotFound(CourseId),

    /// A requested course exists but is not published for sale.
    #[error("course not published: {0}")]
    CourseNotPublished(CourseId),

    /// A course carries a negative price in the catalog.
    #[error("negative price for course {0}")]
    NegativePrice(CourseId),

    /// The order contains no items.
    #[error("order contains no items")]
    EmptyOrder,

    /// The user already purchased this course in a paid order.
    #[error("course already purchased: {0}")]
    AlreadyPurchased(CourseId),

    /// Mixed cash + wallet payment is not supported.
    #[error("mixed cash and cookie payment is not supported")]
    MixedPaymentUnsupported,

    /// The coupon does not belong to the requesting user.
    #[error("coupon does not belong to the requesting user")]
    CouponNotOwned,

    /// The issued coupon is not in the `Available` state.
    #[error("coupon is not available (already used or expired)")]
    CouponNotAvailable,

    /// The issued coupon has passed its expiry date.
    #[error("coupon has expired")]
    CouponExpired,

    /// The parent coupon has been deactivated.
    #[error("coupon is inactive")]
    CouponInactive,

    /// The parent coupon is outside its validity window.
    #[error("coupon is outside its validity window")]
    CouponOutsideWindow,

    /// The parent coupon hit its usage limit.
    #[error("coupon usage limit reached")]
    CouponUsageLimitReached,

    /// The pre-discount order amount is below the coupon's minimum.
    #[error("order amount {amount} is below coupon minimum {minimum}")]
    CouponMinimumNotMet {
        /// Pre-discount order amount.
        amount: i64,
        /// Coupon minimum-amount threshold.
        minimum: i64,
    },

    /// Today's cash spending cap would be exceeded.
    #[error("daily cash limit exceeded: spent={spent}, requested={requested}, cap={cap}")]
    DailyCashLimitExceeded {
        /// Cash already spent today.
        spent: i64,
        /// Requested amount.
        requested: i64,
        /// Configured cap.
        cap: i64,
    },

    /// Today's cookie spending cap would be exceeded.
    #[error("daily cookie limit exceeded: spent={spent}, requested={requested}, cap={cap}")]
    DailyCookieLimitExceeded {
        /// Cookies already spent today.
        spent: i64,
        /// Requested amount.
        requested: i64,
        /// Configured cap.
        cap: i64,
    },

    /// The wallet balance cannot cover the requested debit.
    #[error("insufficient cookies: balance={balance}, required={required}")]
    InsufficientCookies {
        /// Spendable balance across active, non-expired batches.
        balance: i64,
        /// Requested debit.
        required: i64,
    },

    /// The server-computed total does not match the client-declared total.
    #[error("amount mismatch: expected={expected}, declared={declared}")]
    AmountMismatch {
        /// Server-computed total (item prices minus discount).
        expected: i64,
        /// Client-declared total.
        declared: i64,
    },

    /// A refund request arrived after the item's refund window closed.
    #[error("refund window closed at {closed_at}")]
    RefundWindowClosed {
        /// When the window closed.
        closed_at: chrono::DateTime<chrono::Utc>,
    },
}

/// Lost-race signals: the entity moved to another state first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// Another in-flight request holds the same idempotency key.
    #[error("duplicate request for idempotency key: {key}")]
    DuplicateRequest {
        /// The contested idempotency key.
        key: String,
    },

    /// The hold was no longer `Held` when the transition was attempted.
    #[error("hold is no longer held (current status: {status:?})")]
    StaleHold {
        /// The status the hold had already reached.
        status: HoldStatus,
    },

    /// The ledger row was already settled; settlement is terminal.
    #[error("ledger already settled: {0}")]
    AlreadySettled(LedgerId),

    /// The ledger row was permanently blocked by a refund.
    #[error("ledger blocked by refund: {0}")]
    LedgerBlocked(LedgerId),
}

/// Broken accounting invariants. Fatal; abort and alert.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// `net + fee` does not reproduce the gross amount.
    #[error("amount split mismatch: net={net} + fee={fee} != total={total}")]
    AmountSplitMismatch {
        /// Instructor share.
        net: i64,
        /// Platform cut.
        fee: i64,
        /// Expected gross.
        total: i64,
    },

    /// Attempted to settle a ledger row that is not eligible.
    #[error("cannot settle ineligible ledger: {0}")]
    SettleIneligible(LedgerId),

    /// A single batch was asked for more than it has remaining.
    #[error("batch overdraw on {batch}: requested={requested}, remaining={remaining}")]
    BatchOverdraw {
        /// The batch that would go negative.
        batch: BatchId,
        /// Quantity requested from it.
        requested: i64,
        /// Quantity it has left.
        remaining: i64,
    },

    /// A negative amount reached an accounting path that forbids it.
    #[error("negative amount in accounting path: {0}")]
    NegativeAmount(i64),

    /// An amount computation exceeded the 64-bit accounting range.
    #[error("amount arithmetic overflowed")]
    AmountOverflow,
}
