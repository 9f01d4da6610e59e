//! Order and order-item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CourseId, InstructorId, IssuedCouponId, OrderId, OrderItemId, UserId};

/// How an order is paid. Exactly one method per order; mixed cash + cookie
/// payment is an intentional product constraint, rejected at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// External gateway capture.
    Cash,

    /// Prepaid cookie wallet debit.
    Cookie,
}

/// What kind of sellable an order line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// A whole course.
    Course,

    /// A single course section sold separately.
    Section,

    /// A cookie top-up bundle (credits the wallet, no settlement ledger).
    CookieBundle,
}

impl ItemType {
    /// Whether this item produces a settlement ledger row for an instructor.
    #[must_use]
    pub const fn is_settleable(&self) -> bool {
        matches!(self, Self::Course | Self::Section)
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Payment captured and the order committed.
    Paid,

    /// At least one item was refunded.
    Refunded,
}

/// One sellable line inside an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Line item ID (ULID).
    pub id: OrderItemId,

    /// What kind of sellable this line is.
    pub item_type: ItemType,

    /// The course (or section's parent course) being sold.
    pub course_id: CourseId,

    /// The instructor who earns the revenue share for this line.
    pub instructor_id: InstructorId,

    /// Catalog price at purchase time, in minor units.
    pub price: i64,
}

impl OrderItem {
    /// Create a new course line item.
    #[must_use]
    pub fn course(course_id: CourseId, instructor_id: InstructorId, price: i64) -> Self {
        Self {
            id: OrderItemId::generate(),
            item_type: ItemType::Course,
            course_id,
            instructor_id,
            price,
        }
    }
}

/// A committed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID (ULID, time-ordered).
    pub id: OrderId,

    /// Human-facing order number.
    pub order_number: String,

    /// The purchasing user.
    pub user_id: UserId,

    /// Order lines.
    pub items: Vec<OrderItem>,

    /// Payment method (single, never mixed).
    pub method: PaymentMethod,

    /// The issued coupon applied, if any.
    pub coupon: Option<IssuedCouponId>,

    /// Discount applied, in minor units.
    pub discount_amount: i64,

    /// Final charged amount: `sum(item prices) - discount_amount`.
    pub total_amount: i64,

    /// Client-supplied idempotency key that committed this order.
    pub idempotency_key: String,

    /// Lifecycle status.
    pub status: OrderStatus,

    /// When the order was committed.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Assemble a paid order from validated parts.
    ///
    /// `total_amount` is computed server-side; callers must have already
    /// reconciled it against the client-declared total.
    #[must_use]
    pub fn paid(
        user_id: UserId,
        items: Vec<OrderItem>,
        method: PaymentMethod,
        coupon: Option<IssuedCouponId>,
        discount_amount: i64,
        idempotency_key: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = OrderId::generate();
        let gross: i64 = items.iter().map(|i| i.price).sum();
        Self {
            id,
            order_number: format!("ORD-{id}"),
            user_id,
            items,
            method,
            coupon,
            discount_amount,
            total_amount: gross - discount_amount,
            idempotency_key,
            status: OrderStatus::Paid,
            created_at: now,
        }
    }

    /// Sum of item prices before discount.
    #[must_use]
    pub fn gross_amount(&self) -> i64 {
        self.items.iter().map(|i| i.price).sum()
    }
}
