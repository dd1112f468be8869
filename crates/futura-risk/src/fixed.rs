//! conversions between raw token units and the decimal domain

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// largest mantissa a `Decimal` can carry (2^96 - 1)
pub const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// largest scale a `Decimal` can carry
pub const MAX_DECIMALS: u8 = 28;

/// rounding direction when leaving the decimal domain
///
/// borrow limits round down, collateral minimums round up; the safe
/// direction is always the one the vault contract cannot under-enforce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// 10^decimals as a decimal
pub fn pow_ten(decimals: u8) -> Decimal {
    let decimals = decimals.min(MAX_DECIMALS);
    Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0)
}

/// raw token units -> decimal, saturating at the mantissa limit
///
/// saturation only triggers beyond ~7.9e28 raw units; every derived
/// quantity stays bounded rather than wrapping or panicking.
pub fn to_decimal(raw: u128, decimals: u8) -> Decimal {
    let decimals = decimals.min(MAX_DECIMALS);
    let mantissa = raw.min(MAX_MANTISSA);
    Decimal::from_i128_with_scale(mantissa as i128, decimals as u32)
}

/// decimal -> raw token units with explicit rounding
///
/// negative values clamp to zero; values beyond the mantissa limit
/// saturate.
pub fn from_decimal(value: Decimal, decimals: u8, rounding: Rounding) -> u128 {
    if value.is_sign_negative() {
        return 0;
    }
    let scaled = value.saturating_mul(pow_ten(decimals));
    let rounded = match rounding {
        Rounding::Down => scaled.floor(),
        Rounding::Up => scaled.ceil(),
    };
    rounded.to_u128().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exact_units() {
        let raw = 1_234_567_890_123_456_789u128;
        let dec = to_decimal(raw, 18);
        assert_eq!(from_decimal(dec, 18, Rounding::Down), raw);
        assert_eq!(from_decimal(dec, 18, Rounding::Up), raw);
    }

    #[test]
    fn rounding_direction_splits_fractions() {
        // 1.5 units at 0 decimals
        let dec = Decimal::new(15, 1);
        assert_eq!(from_decimal(dec, 0, Rounding::Down), 1);
        assert_eq!(from_decimal(dec, 0, Rounding::Up), 2);
    }

    #[test]
    fn negative_clamps_to_zero() {
        assert_eq!(from_decimal(Decimal::new(-5, 0), 6, Rounding::Down), 0);
    }

    #[test]
    fn oversized_mantissa_saturates() {
        let dec = to_decimal(u128::MAX, 18);
        assert_eq!(dec, to_decimal(MAX_MANTISSA, 18));
    }
}
