//! Seams to the systems the engine does not own.
//!
//! The catalog, user directory, and payment gateway live in other services;
//! the engine talks to them through these traits so tests can substitute
//! in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use coursepay_core::{CourseId, InstructorId, UserId};

/// What the engine needs to know about a course at purchase time.
#[derive(Debug, Clone, Copy)]
pub struct CourseSummary {
    /// The instructor who earns the revenue share.
    pub instructor_id: InstructorId,

    /// Current catalog price, in minor units.
    pub price: i64,

    /// Whether the course is published for sale.
    pub is_published: bool,
}

/// Course catalog lookup.
pub trait CourseCatalog: Send + Sync {
    /// Look up a course, `None` if it does not exist.
    fn get_course(&self, course_id: &CourseId) -> Option<CourseSummary>;
}

/// User directory lookup.
pub trait UserDirectory: Send + Sync {
    /// Whether the user exists and may purchase.
    fn exists(&self, user_id: &UserId) -> bool;
}

/// A successful gateway capture.
#[derive(Debug, Clone)]
pub struct GatewayCapture {
    /// Gateway-side reference, kept for compensating refunds.
    pub reference: String,

    /// Amount actually captured, in minor units.
    pub amount: i64,
}

/// External payment gateway for cash orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture `amount` from the user's registered payment method.
    ///
    /// # Errors
    ///
    /// Returns a gateway-side failure message (declined, unavailable).
    async fn capture(
        &self,
        user_id: &UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<GatewayCapture, String>;

    /// Refund a previous capture by its gateway reference.
    ///
    /// # Errors
    ///
    /// Returns a gateway-side failure message.
    async fn refund(&self, reference: &str, amount: i64) -> Result<(), String>;
}

/// Time source, injectable so tests can pin and advance the clock.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests.
#[derive(Debug)]
pub struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

impl FixedClock {
    /// Create a clock pinned at the given instant.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(now))
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
