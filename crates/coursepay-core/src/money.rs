//! Integer money arithmetic.
//!
//! All amounts are `i64` minor units. Percentage math rounds half-up in
//! integer space; nothing in this module touches floating point.

use crate::error::IntegrityError;

/// Basis points in a whole (100%).
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Split a gross amount into `(net, fee)` using a fee rate in basis points.
///
/// The fee is rounded half-up; the net is the exact remainder, so
/// `net + fee == gross` always holds.
///
/// # Errors
///
/// Returns [`IntegrityError::NegativeAmount`] if `gross` is negative, or
/// [`IntegrityError::AmountOverflow`] if the scaled amount exceeds `i64`.
pub fn fee_split(gross: i64, rate_bps: u32) -> Result<(i64, i64), IntegrityError> {
    if gross < 0 {
        return Err(IntegrityError::NegativeAmount(gross));
    }
    let fee = gross
        .checked_mul(i64::from(rate_bps))
        .and_then(|scaled| div_round_half_up(scaled, BPS_DENOMINATOR))
        .ok_or(IntegrityError::AmountOverflow)?;
    Ok((gross - fee, fee))
}

/// Compute `percent`% of `amount`, rounded half-up.
///
/// # Errors
///
/// Returns [`IntegrityError::NegativeAmount`] if `amount` is negative, or
/// [`IntegrityError::AmountOverflow`] if the scaled amount exceeds `i64`.
pub fn percent_of(amount: i64, percent: u8) -> Result<i64, IntegrityError> {
    if amount < 0 {
        return Err(IntegrityError::NegativeAmount(amount));
    }
    amount
        .checked_mul(i64::from(percent))
        .and_then(|scaled| div_round_half_up(scaled, 100))
        .ok_or(IntegrityError::AmountOverflow)
}

/// Integer division rounding half away from zero, for non-negative
/// numerators. `None` when adding the rounding bias overflows.
fn div_round_half_up(numerator: i64, denominator: i64) -> Option<i64> {
    Some(numerator.checked_add(denominator / 2)? / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_preserves_total() {
        for gross in [0, 1, 99, 100, 12_345, 50_000, 1_000_000] {
            for rate in [0u32, 1, 500, 3_000, 9_999, 10_000] {
                let (net, fee) = fee_split(gross, rate).unwrap();
                assert_eq!(net + fee, gross, "gross={gross} rate={rate}");
                assert!(fee >= 0);
                assert!(net >= 0);
            }
        }
    }

    #[test]
    fn fee_split_rounds_half_up() {
        // 30% of 5 = 1.5 -> rounds to 2
        let (net, fee) = fee_split(5, 3_000).unwrap();
        assert_eq!(fee, 2);
        assert_eq!(net, 3);
    }

    #[test]
    fn fee_split_rejects_negative_gross() {
        assert!(matches!(
            fee_split(-1, 3_000),
            Err(IntegrityError::NegativeAmount(-1))
        ));
    }

    #[test]
    fn percent_of_rounds_half_up() {
        assert_eq!(percent_of(10_000, 20).unwrap(), 2_000);
        // 15% of 10 = 1.5 -> 2
        assert_eq!(percent_of(10, 15).unwrap(), 2);
        // 14% of 10 = 1.4 -> 1
        assert_eq!(percent_of(10, 14).unwrap(), 1);
        assert_eq!(percent_of(0, 50).unwrap(), 0);
    }

    #[test]
    fn percent_of_rejects_negative_amount() {
        assert!(percent_of(-100, 10).is_err());
    }

    #[test]
    fn extreme_amounts_fail_loudly_instead_of_wrapping() {
        assert!(matches!(
            fee_split(i64::MAX, 3_000),
            Err(IntegrityError::AmountOverflow)
        ));
        assert!(matches!(
            percent_of(i64::MAX, 2),
            Err(IntegrityError::AmountOverflow)
        ));
        // the largest representable gross still splits cleanly at 0 bps
        assert_eq!(fee_split(i64::MAX, 0).unwrap(), (i64::MAX, 0));
    }
}
