//! Core types for the coursepay settlement and wallet accounting engine.
//!
//! This crate provides the domain model shared across the platform:
//!
//! - **Identifiers**: `UserId`, `OrderId`, `LedgerId`, `BatchId`, ...
//! - **Orders**: `Order`, `OrderItem`, `PaymentMethod`, `ItemType`
//! - **Coupons**: `Coupon`, `IssuedCoupon`, `CouponKind`
//! - **Settlement**: `SettlementLedger`, `SettlementHold` state machines
//! - **Wallet**: `CookieBatch` FIFO credit ledger
//! - **Limits**: `DailyLimitAggregate`, `DailyLimitPolicy`
//!
//! # Money
//!
//! All amounts are integer minor units (e.g. KRW won) stored as `i64`.
//! There is no floating point anywhere in the accounting path; percentage
//! math rounds half-up in integer space.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod coupon;
pub mod error;
pub mod ids;
pub mod limits;
pub mod money;
pub mod order;
pub mod settlement;
pub mod wallet;

pub use coupon::{Coupon, CouponKind, CouponStatus, IssuedCoupon};
pub use error::{ConflictError, IntegrityError, ValidationError};
pub use ids::{
    BatchId, CouponId, CourseId, HoldId, IdError, InstructorId, IssuedCouponId, LedgerId, OrderId,
    OrderItemId, UserId,
};
pub use limits::{DailyLimitAggregate, DailyLimitPolicy};
pub use money::{fee_split, percent_of};
pub use order::{ItemType, Order, OrderItem, OrderStatus, PaymentMethod};
pub use settlement::{HoldStatus, SettleError, SettlementHold, SettlementLedger};
pub use wallet::{spend_order, BatchSource, CookieBatch, CookieType};
