//! futura-risk: pure risk math for collateralized futures positions
//!
//! all money math happens in a fixed-point decimal domain; raw on-chain
//! amounts (`u128` + per-currency decimals) are converted at the edges.
//! every function here is total: degenerate inputs (zero prices, zero
//! collateral) produce degenerate values, never panics.
//!
//! ## usage
//!
//! ```rust
//! use futura_risk::{ltv, max_loanable_amount};
//! use rust_decimal::Decimal;
//!
//! // no collateral means no position, not a division error
//! let r = ltv(18, Decimal::from(150), 1_000, 6, Decimal::ONE, 0);
//! assert_eq!(r, Decimal::ZERO);
//!
//! // oracle outage reads as "nothing loanable", not "free to borrow"
//! let max = max_loanable_amount(18, Decimal::ZERO, 6, Decimal::ONE, 1_000_000, 700_000, 1_000_000);
//! assert_eq!(max, 0);
//! ```

pub mod fixed;
pub mod ltv;

pub use fixed::{from_decimal, pow_ten, to_decimal, Rounding, MAX_DECIMALS, MAX_MANTISSA};
pub use ltv::{
    liquidation_price, ltv, ltv_percent, max_loanable_amount, min_collateral_amount,
    settle_proceeds, value_of, SETTLE_PRICE_DECIMALS,
};
