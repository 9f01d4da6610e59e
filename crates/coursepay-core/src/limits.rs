//! Per-user daily spending limits.
//!
//! One [`DailyLimitAggregate`] row exists per (user, calendar day), created
//! lazily on the first spend of the day and incremented on every spend
//! after that.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::UserId;
use crate::order::PaymentMethod;

/// Running cash/cookie totals for one user on one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLimitAggregate {
    /// The spending user.
    pub user_id: UserId,

    /// Calendar day (UTC).
    pub day: NaiveDate,

    /// Cash spent this day, in minor units.
    pub cash_sum: i64,

    /// Cookies spent this day.
    pub cookie_sum: i64,
}

impl DailyLimitAggregate {
    /// Create an empty aggregate for the first spend of the day.
    #[must_use]
    pub const fn new(user_id: UserId, day: NaiveDate) -> Self {
        Self {
            user_id,
            day,
            cash_sum: 0,
            cookie_sum: 0,
        }
    }

    /// Total already spent with the given method.
    #[must_use]
    pub const fn spent(&self, method: PaymentMethod) -> i64 {
        match method {
            PaymentMethod::Cash => self.cash_sum,
            PaymentMethod::Cookie => self.cookie_sum,
        }
    }

    /// Record a committed spend.
    pub fn record(&mut self, method: PaymentMethod, amount: i64) {
        match method {
            PaymentMethod::Cash => self.cash_sum += amount,
            PaymentMethod::Cookie => self.cookie_sum += amount,
        }
    }
}

/// Configured per-user daily caps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyLimitPolicy {
    /// Maximum cash spend per user per day, in minor units.
    pub cash_cap: i64,

    /// Maximum cookie spend per user per day.
    pub cookie_cap: i64,
}

impl DailyLimitPolicy {
    /// Check whether a new spend would exceed the cap for its method.
    ///
    /// `aggregate` is `None` on the first spend of the day.
    ///
    /// # Errors
    ///
    /// Returns the method-specific limit error with the exact amounts.
    pub fn check(
        &self,
        aggregate: Option<&DailyLimitAggregate>,
        method: PaymentMethod,
        amount: i64,
    ) -> Result<(), ValidationError> {
        let spent = aggregate.map_or(0, |a| a.spent(method));
        let (cap, exceeded): (i64, fn(i64, i64, i64) -> ValidationError) = match method {
            PaymentMethod::Cash => (self.cash_cap, |spent, requested, cap| {
                ValidationError::DailyCashLimitExceeded { spent, requested, cap }
            }),
            PaymentMethod::Cookie => (self.cookie_cap, |spent, requested, cap| {
                ValidationError::DailyCookieLimitExceeded { spent, requested, cap }
            }),
        };
        if spent + amount > cap {
            return Err(exceeded(spent, amount, cap));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: DailyLimitPolicy = DailyLimitPolicy {
        cash_cap: 1_000_000,
        cookie_cap: 10_000,
    };

    fn aggregate(cash: i64, cookie: i64) -> DailyLimitAggregate {
        let mut agg = DailyLimitAggregate::new(
            UserId::generate(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        );
        agg.cash_sum = cash;
        agg.cookie_sum = cookie;
        agg
    }

    #[test]
    fn first_spend_of_day_passes_within_cap() {
        assert!(POLICY.check(None, PaymentMethod::Cash, 500_000).is_ok());
        assert!(POLICY.check(None, PaymentMethod::Cookie, 10_000).is_ok());
    }

    #[test]
    fn first_spend_still_bounded_by_cap() {
        assert!(POLICY.check(None, PaymentMethod::Cash, 1_000_001).is_err());
    }

    #[test]
    fn running_total_enforced_per_method() {
        let agg = aggregate(900_000, 9_000);

        assert!(POLICY.check(Some(&agg), PaymentMethod::Cash, 100_000).is_ok());
        let err = POLICY
            .check(Some(&agg), PaymentMethod::Cash, 100_001)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DailyCashLimitExceeded { spent: 900_000, requested: 100_001, cap: 1_000_000 }
        ));

        // cookie cap independent of cash spend
        assert!(POLICY.check(Some(&agg), PaymentMethod::Cookie, 1_000).is_ok());
        assert!(POLICY.check(Some(&agg), PaymentMethod::Cookie, 1_001).is_err());
    }

    #[test]
    fn record_accumulates() {
        let mut agg = aggregate(0, 0);
        agg.record(PaymentMethod::Cash, 10_000);
        agg.record(PaymentMethod::Cash, 5_000);
        agg.record(PaymentMethod::Cookie, 80);
        assert_eq!(agg.cash_sum, 15_000);
        assert_eq!(agg.cookie_sum, 80);
    }
}
