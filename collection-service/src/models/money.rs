//! Minor-unit money conversion.
//!
//! All internal arithmetic uses signed 64-bit minor units (paise for INR).
//! Decimal amounts exist only at the REST boundary; user-supplied decimals
//! are converted with banker's rounding.

use anyhow::anyhow;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Fraction digits for the supported currency (INR: 100 paise per rupee).
const FRACTION_DIGITS: u32 = 2;

/// Convert a REST-boundary decimal amount to minor units.
pub fn to_minor(amount: Decimal) -> Result<i64, AppError> {
    let scaled = (amount * Decimal::from(10i64.pow(FRACTION_DIGITS)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    scaled
        .to_i64()
        .ok_or_else(|| AppError::BadRequest(anyhow!("amount out of range: {}", amount)))
}

/// Convert minor units back to a decimal for API responses.
pub fn to_decimal(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, FRACTION_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn whole_rupees_convert_exactly() {
        assert_eq!(to_minor(dec("5000")).unwrap(), 500_000);
        assert_eq!(to_minor(dec("5000.00")).unwrap(), 500_000);
        assert_eq!(to_minor(dec("0.01")).unwrap(), 1);
    }

    #[test]
    fn banker_rounding_on_sub_paise_midpoints() {
        // Midpoints round to the even paise value.
        assert_eq!(to_minor(dec("0.125")).unwrap(), 12);
        assert_eq!(to_minor(dec("0.135")).unwrap(), 14);
        assert_eq!(to_minor(dec("0.115")).unwrap(), 12);
    }

    #[test]
    fn round_trips_through_decimal() {
        assert_eq!(to_decimal(500_000), dec("5000.00"));
        assert_eq!(to_minor(to_decimal(123_456)).unwrap(), 123_456);
        assert_eq!(to_decimal(1), dec("0.01"));
    }
}
