//! The payment validation pipeline.
//!
//! Checks run in a fixed order so a request failing several ways always
//! reports the same (earliest) reason:
//!
//! 1. idempotency replay
//! 2. user exists
//! 3. per-item: course exists, published, non-negative price, not already
//!    purchased (including duplicates inside the request)
//! 4. payment method derivation (mixed cash + cookie rejected)
//! 5. coupon ownership / availability / applicability
//! 6. discount computation
//! 7. daily spending limits
//! 8. cookie balance (cookie orders)
//! 9. amount reconciliation against the client-declared total
//!
//! Validation reads but never writes; the atomic commit re-checks the
//! racy guards (idempotency key, wallet balance) under a lock.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use coursepay_core::{
    Coupon, CourseId, IssuedCoupon, IssuedCouponId, Order, OrderItem, PaymentMethod, UserId,
    ValidationError,
};
use coursepay_store::Store;

use crate::collaborators::{CourseCatalog, UserDirectory};
use crate::config::EngineConfig;
use crate::error::Result;

/// A client payment request, as it arrives from the outer surface.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// The purchasing user.
    pub user_id: UserId,

    /// Courses to purchase.
    pub course_ids: Vec<CourseId>,

    /// Issued coupon to redeem, if any.
    pub coupon: Option<IssuedCouponId>,

    /// Portion paid from the cookie wallet. Must be `0` (cash order) or
    /// equal to the declared total (cookie order); anything else is a
    /// mixed payment and is rejected.
    pub cookie_amount: i64,

    /// Client-computed total, reconciled against the server-side total.
    pub declared_total: i64,

    /// Client-supplied idempotency key.
    pub idempotency_key: String,
}

/// Everything validation established about a fresh (non-replayed) request.
#[derive(Debug)]
pub struct ValidatedPayment {
    /// Priced order lines.
    pub items: Vec<OrderItem>,

    /// Derived payment method.
    pub method: PaymentMethod,

    /// Coupon state to persist at commit, already mutated (redemption
    /// counted, issue marked used).
    pub coupon: Option<(Coupon, IssuedCoupon)>,

    /// Discount applied, in minor units.
    pub discount: i64,

    /// Server-computed total: gross minus discount.
    pub total: i64,
}

/// Outcome of the pipeline.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// The idempotency key was already committed; return that order.
    Replayed(Order),

    /// A fresh request that passed every check.
    Fresh(ValidatedPayment),
}

/// Run the full pipeline against current state.
///
/// # Errors
///
/// Returns the earliest failing check's [`ValidationError`].
pub fn validate_payment(
    store: &dyn Store,
    catalog: &dyn CourseCatalog,
    users: &dyn UserDirectory,
    config: &EngineConfig,
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> Result<ValidationOutcome> {
    // 1. idempotency replay
    if let Some(order) = store.find_order_by_idempotency_key(&request.idempotency_key)? {
        tracing::debug!(
            key = %request.idempotency_key,
            order_id = %order.id,
            "idempotent replay"
        );
        return Ok(ValidationOutcome::Replayed(order));
    }

    // 2. user
    if !users.exists(&request.user_id) {
        return Err(ValidationError::UserNotFound(request.user_id).into());
    }

    // 3. items
    if request.course_ids.is_empty() {
        return Err(ValidationError::EmptyOrder.into());
    }
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(request.course_ids.len());
    for course_id in &request.course_ids {
        let course = catalog
            .get_course(course_id)
            .ok_or(ValidationError::CourseNotFound(*course_id))?;
        if !course.is_published {
            return Err(ValidationError::CourseNotPublished(*course_id).into());
        }
        if course.price < 0 {
            return Err(ValidationError::NegativePrice(*course_id).into());
        }
        if !seen.insert(*course_id) || store.has_paid_purchase(&request.user_id, course_id)? {
            return Err(ValidationError::AlreadyPurchased(*course_id).into());
        }
        items.push(OrderItem::course(*course_id, course.instructor_id, course.price));
    }
    let gross: i64 = items.iter().map(|i| i.price).sum();

    // 4. payment method
    let method = if request.cookie_amount == 0 {
        PaymentMethod::Cash
    } else if request.cookie_amount == request.declared_total {
        PaymentMethod::Cookie
    } else {
        return Err(ValidationError::MixedPaymentUnsupported.into());
    };

    // 5 + 6. coupon and discount; the minimum-amount check runs against the
    // pre-discount gross.
    let (coupon, discount) = match request.coupon {
        Some(issued_id) => {
            let mut issued = store
                .get_issued_coupon(&issued_id)?
                .ok_or(ValidationError::CouponNotAvailable)?;
            issued.check_redeemable(&request.user_id, now)?;

            let mut template = store
                .get_coupon(&issued.coupon_id)?
                .ok_or(ValidationError::CouponNotAvailable)?;
            template.check_applicable(gross, now)?;

            let discount = template.discount_for(gross);
            template.increment_used_count();
            issued.mark_used(now);
            (Some((template, issued)), discount)
        }
        None => (None, 0),
    };
    let total = gross - discount;

    // 7. daily limits
    let aggregate = store.get_daily_limit(&request.user_id, now.date_naive())?;
    config.limit_policy().check(aggregate.as_ref(), method, total)?;

    // 8. cookie balance (re-checked under the lock at commit)
    if method == PaymentMethod::Cookie {
        let balance = store.cookie_balance(&request.user_id, now)?;
        if balance < total {
            return Err(ValidationError::InsufficientCookies {
                balance,
                required: total,
            }
            .into());
        }
    }

    // 9. amount reconciliation
    if total != request.declared_total {
        return Err(ValidationError::AmountMismatch {
            expected: total,
            declared: request.declared_total,
        }
        .into());
    }

    Ok(ValidationOutcome::Fresh(ValidatedPayment {
        items,
        method,
        coupon,
        discount,
        total,
    }))
}
