//! loan-to-value derivations
//!
//! the four derivations must agree with each other and with the vault
//! contract's own checks: borrowing exactly `max_loanable_amount` must
//! read back as exactly the max LTV, and withdrawing down to exactly
//! `min_collateral_amount` likewise. collateral withdrawal is bounded by
//! the max LTV, not the liquidation threshold, so a freshly adjusted
//! position always keeps the full buffer between the two.

use rust_decimal::Decimal;

use crate::fixed::{from_decimal, to_decimal, Rounding};

/// scale of the on-chain settle price (collateral units per debt unit)
pub const SETTLE_PRICE_DECIMALS: u8 = 18;

/// usd value of a raw amount at a price
pub fn value_of(raw: u128, decimals: u8, price: Decimal) -> Decimal {
    to_decimal(raw, decimals).saturating_mul(price)
}

/// scaled ltv parameter -> percentage
pub fn ltv_percent(part: u32, precision: u32) -> Decimal {
    if precision == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part) / Decimal::from(precision) * Decimal::ONE_HUNDRED
}

fn ratio(part: u32, precision: u32) -> Decimal {
    if precision == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part) / Decimal::from(precision)
}

/// current loan-to-value as a percentage
///
/// zero collateral value reads as `0` ("no position"), uniformly across
/// every caller.
pub fn ltv(
    debt_decimals: u8,
    debt_price: Decimal,
    debt_amount: u128,
    collateral_decimals: u8,
    collateral_price: Decimal,
    collateral_amount: u128,
) -> Decimal {
    let debt_value = value_of(debt_amount, debt_decimals, debt_price);
    let collateral_value = value_of(collateral_amount, collateral_decimals, collateral_price);
    match debt_value.checked_div(collateral_value) {
        Some(r) => r.saturating_mul(Decimal::ONE_HUNDRED),
        // division by zero is "no position"; overflow is maximal risk
        None if collateral_value.is_zero() => Decimal::ZERO,
        None => Decimal::MAX,
    }
}

/// debt-asset price at which the position hits the liquidation threshold
///
/// solves `debt_units * p == collateral_value * threshold / precision`
/// with the collateral price held fixed. `0` means no liquidation risk
/// (no debt).
pub fn liquidation_price(
    debt_decimals: u8,
    debt_amount: u128,
    collateral_decimals: u8,
    collateral_price: Decimal,
    collateral_amount: u128,
    liquidation_threshold: u32,
    ltv_precision: u32,
) -> Decimal {
    if debt_amount == 0 {
        return Decimal::ZERO;
    }
    let collateral_value = value_of(collateral_amount, collateral_decimals, collateral_price);
    let threshold_value = collateral_value.saturating_mul(ratio(liquidation_threshold, ltv_precision));
    let debt_units = to_decimal(debt_amount, debt_decimals);
    threshold_value.checked_div(debt_units).unwrap_or(Decimal::ZERO)
}

/// largest debt amount (raw units) borrowable against the collateral
///
/// floors to raw units so the resulting LTV never exceeds the max. a
/// zero price on either side means the oracle is unavailable and nothing
/// is loanable.
pub fn max_loanable_amount(
    debt_decimals: u8,
    debt_price: Decimal,
    collateral_decimals: u8,
    collateral_price: Decimal,
    collateral_amount: u128,
    max_ltv: u32,
    ltv_precision: u32,
) -> u128 {
    if debt_price <= Decimal::ZERO || collateral_price <= Decimal::ZERO {
        return 0;
    }
    let collateral_value = value_of(collateral_amount, collateral_decimals, collateral_price);
    let max_debt_value = collateral_value.saturating_mul(ratio(max_ltv, ltv_precision));
    let debt_units = match max_debt_value.checked_div(debt_price) {
        Some(u) => u,
        None => return 0,
    };
    from_decimal(debt_units, debt_decimals, Rounding::Down)
}

/// smallest collateral amount (raw units) that keeps the debt at or
/// under the max LTV
///
/// ceils to raw units so the resulting LTV never exceeds the max. with
/// debt outstanding and no usable collateral price, the minimum is
/// unbounded (`u128::MAX`): nothing may be withdrawn until the oracle
/// recovers.
pub fn min_collateral_amount(
    debt_decimals: u8,
    debt_price: Decimal,
    debt_amount: u128,
    collateral_decimals: u8,
    collateral_price: Decimal,
    max_ltv: u32,
    ltv_precision: u32,
) -> u128 {
    if debt_amount == 0 {
        return 0;
    }
    if collateral_price <= Decimal::ZERO || max_ltv == 0 || ltv_precision == 0 {
        return u128::MAX;
    }
    let debt_value = value_of(debt_amount, debt_decimals, debt_price);
    let min_collateral_value = match debt_value.checked_div(ratio(max_ltv, ltv_precision)) {
        Some(v) => v,
        None => return u128::MAX,
    };
    let collateral_units = match min_collateral_value.checked_div(collateral_price) {
        Some(u) => u,
        None => return u128::MAX,
    };
    from_decimal(collateral_units, collateral_decimals, Rounding::Up)
}

/// collateral returned for burning debt units at the recorded settle
/// price, floored to collateral raw units
pub fn settle_proceeds(
    debt_amount: u128,
    debt_decimals: u8,
    settle_price: u128,
    collateral_decimals: u8,
) -> u128 {
    let debt_units = to_decimal(debt_amount, debt_decimals);
    let rate = to_decimal(settle_price, SETTLE_PRICE_DECIMALS);
    from_decimal(debt_units.saturating_mul(rate), collateral_decimals, Rounding::Down)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRECISION: u32 = 1_000_000;
    const MAX_LTV: u32 = 700_000;
    const THRESHOLD: u32 = 800_000;

    fn close_to(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn zero_collateral_reads_as_zero_ltv() {
        let r = ltv(18, Decimal::from(150), 1_000_000, 6, Decimal::ONE, 0);
        assert_eq!(r, Decimal::ZERO);
    }

    #[test]
    fn zero_debt_means_no_liquidation_risk() {
        let p = liquidation_price(18, 0, 6, Decimal::ONE, 1_000_000_000, THRESHOLD, PRECISION);
        assert_eq!(p, Decimal::ZERO);
    }

    #[test]
    fn zero_price_saturates_loanable_to_zero() {
        assert_eq!(
            max_loanable_amount(18, Decimal::ZERO, 6, Decimal::ONE, 1_000_000_000, MAX_LTV, PRECISION),
            0
        );
        assert_eq!(
            max_loanable_amount(18, Decimal::from(150), 6, Decimal::ZERO, 1_000_000_000, MAX_LTV, PRECISION),
            0
        );
    }

    #[test]
    fn unpriced_collateral_blocks_withdrawal() {
        let min = min_collateral_amount(18, Decimal::from(150), 1, 6, Decimal::ZERO, MAX_LTV, PRECISION);
        assert_eq!(min, u128::MAX);
    }

    // 1,000 collateral units at $1 against a $150 debt asset: max loan is
    // 1000 * 0.7 / 150 = 4.666... debt units, which reads back as 70% LTV
    // and liquidates when the debt asset reaches 800 / 4.666... = $171.43.
    #[test]
    fn worked_scenario_cross_checks() {
        let collateral_raw = 1_000_000_000u128; // 1,000 units at 6 decimals
        let debt_price = Decimal::from(150);
        let collateral_price = Decimal::ONE;

        let loanable = max_loanable_amount(18, debt_price, 6, collateral_price, collateral_raw, MAX_LTV, PRECISION);
        assert_eq!(loanable, 4_666_666_666_666_666_666);

        let read_back = ltv(18, debt_price, loanable, 6, collateral_price, collateral_raw);
        assert!(close_to(read_back, Decimal::from(70), Decimal::new(1, 6)), "ltv {read_back}");

        let liq = liquidation_price(18, loanable, 6, collateral_price, collateral_raw, THRESHOLD, PRECISION);
        assert!(close_to(liq, Decimal::new(17142857, 5), Decimal::new(1, 2)), "liq {liq}");
    }

    #[test]
    fn min_collateral_reads_back_as_max_ltv() {
        let debt_raw = 4_666_666_666_666_666_666u128;
        let debt_price = Decimal::from(150);
        let collateral_price = Decimal::ONE;

        let min = min_collateral_amount(18, debt_price, debt_raw, 6, collateral_price, MAX_LTV, PRECISION);
        let read_back = ltv(18, debt_price, debt_raw, 6, collateral_price, min);
        assert!(read_back <= Decimal::from(70));
        // one collateral unit less would breach the max
        let breached = ltv(18, debt_price, debt_raw, 6, collateral_price, min - 1);
        assert!(breached > Decimal::new(69_9999, 4), "breached {breached}");
    }

    #[test]
    fn settle_proceeds_converts_across_decimals() {
        // 2.5 debt units at a settle price of 171.5 collateral per debt
        let debt_raw = 2_500_000_000_000_000_000u128; // 18 decimals
        let settle = 171_500_000_000_000_000_000u128; // 171.5 at 18 decimals
        let out = settle_proceeds(debt_raw, 18, settle, 6);
        assert_eq!(out, 428_750_000); // 428.75 collateral units at 6 decimals
    }
}
