//! Coupon templates and per-user issued coupons.
//!
//! A `Coupon` is the template an operator creates (type, value, validity
//! window, usage limit); an `IssuedCoupon` is one user's claim on it. All
//! state changes go through explicit mutators so the invariants stay visible
//! at the call site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{CouponId, IssuedCouponId, UserId};
use crate::money::percent_of;

/// How a coupon discounts an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum CouponKind {
    /// Percentage off the pre-discount order total, rounded half-up.
    Percent(u8),

    /// Fixed amount off, in minor units.
    Amount(i64),
}

/// A coupon template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon template ID.
    pub id: CouponId,

    /// Display name.
    pub name: String,

    /// Discount kind and value.
    pub kind: CouponKind,

    /// Minimum pre-discount order amount required to apply.
    pub minimum_amount: i64,

    /// Cap on the computed discount. `0` means uncapped.
    pub maximum_discount: i64,

    /// Total redemptions allowed across all users. `0` means unlimited.
    pub usage_limit: u64,

    /// Redemptions so far.
    pub used_count: u64,

    /// Whether the template is active.
    pub is_active: bool,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window.
    pub valid_until: DateTime<Utc>,
}

impl Coupon {
    /// Validate this template against the pre-discount order amount.
    ///
    /// # Errors
    ///
    /// Returns the specific failing reason: inactive template, outside the
    /// validity window, usage limit reached, or minimum amount not met.
    pub fn check_applicable(&self, order_amount: i64, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if !self.is_active {
            return Err(ValidationError::CouponInactive);
        }
        if now < self.valid_from || now > self.valid_until {
            return Err(ValidationError::CouponOutsideWindow);
        }
        if self.usage_limit > 0 && self.used_count >= self.usage_limit {
            return Err(ValidationError::CouponUsageLimitReached);
        }
        if order_amount < self.minimum_amount {
            return Err(ValidationError::CouponMinimumNotMet {
                amount: order_amount,
                minimum: self.minimum_amount,
            });
        }
        Ok(())
    }

    /// Compute the discount for a pre-discount order amount.
    ///
    /// The result is clamped to `[0, order_amount]` and capped by
    /// `maximum_discount` when that cap is positive. The clamp is a business
    /// rule (a coupon never makes an order negative), not an error path.
    #[must_use]
    pub fn discount_for(&self, order_amount: i64) -> i64 {
        let raw = match self.kind {
            // order_amount was validated non-negative upstream
            CouponKind::Percent(rate) => percent_of(order_amount, rate).unwrap_or(0),
            CouponKind::Amount(value) => value,
        };
        let mut discount = raw.clamp(0, order_amount);
        if self.maximum_discount > 0 {
            discount = discount.min(self.maximum_discount);
        }
        discount
    }

    /// Record one redemption.
    pub fn increment_used_count(&mut self) {
        self.used_count += 1;
    }

    /// Deactivate the template.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

/// Lifecycle status of an issued coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    /// Claimable on a future order.
    Available,

    /// Redeemed on an order.
    Used,

    /// Expired before use.
    Expired,
}

/// One user's claim on a coupon template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCoupon {
    /// Issued coupon ID.
    pub id: IssuedCouponId,

    /// The template this was issued from.
    pub coupon_id: CouponId,

    /// The owning user.
    pub user_id: UserId,

    /// Current status.
    pub status: CouponStatus,

    /// Per-issue expiry.
    pub expires_at: DateTime<Utc>,

    /// When it was redeemed, if ever.
    pub used_at: Option<DateTime<Utc>>,
}

impl IssuedCoupon {
    /// Issue a coupon to a user.
    #[must_use]
    pub fn issue(coupon_id: CouponId, user_id: UserId, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: IssuedCouponId::generate(),
            coupon_id,
            user_id,
            status: CouponStatus::Available,
            expires_at,
            used_at: None,
        }
    }

    /// Validate ownership and redeemability for the given user.
    ///
    /// # Errors
    ///
    /// Returns the specific failing reason: wrong owner, not available, or
    /// past its expiry.
    pub fn check_redeemable(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.user_id != *user_id {
            return Err(ValidationError::CouponNotOwned);
        }
        if self.status != CouponStatus::Available {
            return Err(ValidationError::CouponNotAvailable);
        }
        if now > self.expires_at {
            return Err(ValidationError::CouponExpired);
        }
        Ok(())
    }

    /// Mark the coupon redeemed.
    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.status = CouponStatus::Used;
        self.used_at = Some(now);
    }
}
