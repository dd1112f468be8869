//! cross-function round-trip properties
//!
//! borrowing exactly the derived limit must read back as exactly the max
//! LTV (within one raw-unit flooring step), and the same for the derived
//! collateral minimum. these two properties are what keep the client's
//! projections in agreement with the vault contract's checks.

use futura_risk::{
    liquidation_price, ltv, ltv_percent, max_loanable_amount, min_collateral_amount,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const PRECISION: u32 = 1_000_000;
const THRESHOLD: u32 = 800_000;

// one part in 1e9, far below any honest parameter step but far above
// the 28-digit decimal noise floor
fn eps() -> Decimal {
    Decimal::new(1, 9)
}

fn arb_price() -> impl Strategy<Value = Decimal> {
    // 0.1 to 10,000.0 in tenths
    (1i64..=100_000).prop_map(|m| Decimal::new(m, 1))
}

proptest! {
    #[test]
    fn borrowing_the_limit_reads_back_as_max_ltv(
        debt_decimals in 6u8..=18,
        collateral_decimals in 6u8..=18,
        debt_price in arb_price(),
        collateral_price in arb_price(),
        collateral_amount in 1u128..=1_000_000_000,
        max_ltv in 100_000u32..=900_000,
    ) {
        let target = ltv_percent(max_ltv, PRECISION);
        let loanable = max_loanable_amount(
            debt_decimals, debt_price,
            collateral_decimals, collateral_price,
            collateral_amount, max_ltv, PRECISION,
        );

        let read_back = ltv(
            debt_decimals, debt_price, loanable,
            collateral_decimals, collateral_price, collateral_amount,
        );
        prop_assert!(read_back <= target + eps(), "read back {read_back} over target {target}");

        // one more raw unit would breach the limit
        if loanable > 0 {
            let breached = ltv(
                debt_decimals, debt_price, loanable + 1,
                collateral_decimals, collateral_price, collateral_amount,
            );
            prop_assert!(breached >= target - eps(), "breach {breached} under target {target}");
        }
    }

    #[test]
    fn withdrawing_to_the_minimum_reads_back_as_max_ltv(
        debt_decimals in 6u8..=18,
        collateral_decimals in 6u8..=18,
        debt_price in arb_price(),
        collateral_price in arb_price(),
        debt_amount in 1u128..=1_000_000_000,
        max_ltv in 100_000u32..=900_000,
    ) {
        let target = ltv_percent(max_ltv, PRECISION);
        let min_collateral = min_collateral_amount(
            debt_decimals, debt_price, debt_amount,
            collateral_decimals, collateral_price,
            max_ltv, PRECISION,
        );

        let read_back = ltv(
            debt_decimals, debt_price, debt_amount,
            collateral_decimals, collateral_price, min_collateral,
        );
        prop_assert!(read_back <= target + eps(), "read back {read_back} over target {target}");

        // one raw unit less collateral would breach the limit
        if min_collateral > 1 {
            let breached = ltv(
                debt_decimals, debt_price, debt_amount,
                collateral_decimals, collateral_price, min_collateral - 1,
            );
            prop_assert!(breached >= target - eps(), "breach {breached} under target {target}");
        }
    }

    #[test]
    fn more_debt_lowers_the_liquidation_price(
        debt_decimals in 6u8..=18,
        collateral_decimals in 6u8..=18,
        collateral_price in arb_price(),
        debt_amount in 1u128..=1_000_000_000,
        collateral_amount in 1u128..=1_000_000_000,
    ) {
        let lighter = liquidation_price(
            debt_decimals, debt_amount,
            collateral_decimals, collateral_price, collateral_amount,
            THRESHOLD, PRECISION,
        );
        let heavier = liquidation_price(
            debt_decimals, debt_amount * 2,
            collateral_decimals, collateral_price, collateral_amount,
            THRESHOLD, PRECISION,
        );
        prop_assert!(heavier < lighter, "heavier {heavier} not below lighter {lighter}");
    }

    #[test]
    fn more_collateral_never_shrinks_the_limit(
        debt_decimals in 6u8..=18,
        collateral_decimals in 6u8..=18,
        debt_price in arb_price(),
        collateral_price in arb_price(),
        collateral_amount in 1u128..=1_000_000_000,
        max_ltv in 100_000u32..=900_000,
    ) {
        let base = max_loanable_amount(
            debt_decimals, debt_price,
            collateral_decimals, collateral_price,
            collateral_amount, max_ltv, PRECISION,
        );
        let doubled = max_loanable_amount(
            debt_decimals, debt_price,
            collateral_decimals, collateral_price,
            collateral_amount * 2, max_ltv, PRECISION,
        );
        prop_assert!(doubled >= base);
    }
}
