//! Null-propagating decimal arithmetic for derived measures.
//!
//! Every function takes and returns `Option<Decimal>`: `None` stands for a SQL
//! null. Any null operand yields null, and an operation that would divide by
//! zero or overflow yields null instead of panicking.

use rust_decimal::{Decimal, RoundingStrategy};

/// Safe division.
///
/// # Mathematical Definition
/// ```text
/// safe_divide(a, b) = a / b   if a, b non-null and b ≠ 0
///                   = null    otherwise
/// ```
///
/// # Examples
/// ```
/// use mart_core::math::safe_divide;
/// use rust_decimal::Decimal;
///
/// assert_eq!(safe_divide(Some(Decimal::from(10)), Some(Decimal::from(4))), Some(Decimal::new(25, 1)));
/// assert_eq!(safe_divide(Some(Decimal::from(10)), Some(Decimal::ZERO)), None);
/// assert_eq!(safe_divide(Some(Decimal::from(10)), None), None);
/// ```
#[inline]
pub fn safe_divide(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    let (n, d) = (numerator?, denominator?);
    if d.is_zero() {
        return None;
    }
    n.checked_div(d)
}

/// Null-propagating subtraction (`a - b`).
#[inline]
pub fn safe_subtract(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    a?.checked_sub(b?)
}

/// Null-propagating multiplication.
#[inline]
pub fn safe_multiply(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    a?.checked_mul(b?)
}

/// Period-over-period change in percent.
///
/// # Mathematical Definition
/// ```text
/// percent_change(curr, prev) = (curr - prev) / prev × 100
/// ```
///
/// Null when either observation is null or `prev` is zero.
///
/// # Examples
/// ```
/// use mart_core::math::percent_change;
/// use rust_decimal::Decimal;
///
/// let pct = percent_change(Some(Decimal::from(110)), Some(Decimal::from(100)));
/// assert_eq!(pct, Some(Decimal::from(10)));
/// assert_eq!(percent_change(Some(Decimal::from(110)), None), None);
/// ```
pub fn percent_change(current: Option<Decimal>, previous: Option<Decimal>) -> Option<Decimal> {
    let ratio = safe_divide(safe_subtract(current, previous), previous)?;
    ratio.checked_mul(Decimal::ONE_HUNDRED)
}

/// Multiplicative inverse (`1 / x`), null on zero.
#[inline]
pub fn reciprocal(value: Option<Decimal>) -> Option<Decimal> {
    safe_divide(Some(Decimal::ONE), value)
}

/// Rounds to a fixed scale, half away from zero.
///
/// The scale is then fixed even when trailing digits are zero, so `1.5`
/// rounded to scale 2 is stored as `1.50`.
pub fn round_scale(value: Option<Decimal>, scale: u32) -> Option<Decimal> {
    value.map(|v| {
        let mut rounded = v.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(scale);
        rounded
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Option<Decimal> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_safe_divide_zero_is_null() {
        assert_eq!(safe_divide(d("100"), d("0")), None);
        assert_eq!(safe_divide(d("100"), d("0.00")), None);
    }

    #[test]
    fn test_safe_divide_null_operands() {
        assert_eq!(safe_divide(None, d("2")), None);
        assert_eq!(safe_divide(d("2"), None), None);
    }

    #[test]
    fn test_safe_divide_value() {
        assert_eq!(safe_divide(d("100"), d("8")), d("12.5"));
    }

    #[test]
    fn test_safe_subtract() {
        assert_eq!(safe_subtract(d("105.50"), d("100.25")), d("5.25"));
        assert_eq!(safe_subtract(None, d("1")), None);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(d("95"), d("100")), d("-5"));
        assert_eq!(percent_change(d("95"), d("0")), None);
        assert_eq!(percent_change(None, d("100")), None);
    }

    #[test]
    fn test_reciprocal() {
        assert_eq!(reciprocal(d("4")), d("0.25"));
        assert_eq!(reciprocal(d("0")), None);
        assert_eq!(reciprocal(None), None);
    }

    #[test]
    fn test_round_scale_half_away_from_zero() {
        assert_eq!(round_scale(d("1.005"), 2), d("1.01"));
        assert_eq!(round_scale(d("-1.005"), 2), d("-1.01"));
        assert_eq!(round_scale(d("1.5"), 2).unwrap().to_string(), "1.50");
        assert_eq!(round_scale(None, 2), None);
    }

    #[test]
    fn test_overflow_is_null() {
        assert_eq!(safe_multiply(Some(Decimal::MAX), d("2")), None);
    }
}
