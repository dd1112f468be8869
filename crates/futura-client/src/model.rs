//! asset and position data model
//!
//! assets are immutable once created except for `settle_price`, which is
//! zero until settlement and immutable after. positions hold raw amounts
//! only; everything risk-related is derived from current prices on
//! demand and never cached across price updates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use futura_risk as risk;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ClientError;

macro_rules! hex_id {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; $len]);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = ClientError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped)
                    .map_err(|_| ClientError::InvalidAddress(s.to_string()))?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| ClientError::InvalidAddress(s.to_string()))?;
                Ok(Self(arr))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ClientError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.to_string()
            }
        }
    };
}

hex_id!(Address, 20, "20-byte account or token identifier");
hex_id!(TxHash, 32, "32-byte transaction hash");
hex_id!(FeedId, 32, "32-byte oracle price-feed identifier");

/// trading window in minutes-of-day UTC
///
/// advisory only: the authoritative market-hours check is transaction
/// simulation against the oracle-consuming contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    /// first open minute after 00:00 UTC
    pub open_minute: u16,
    /// first closed minute (exclusive end of the window)
    pub close_minute: u16,
    /// closed on saturday/sunday
    pub closed_weekends: bool,
}

impl TradingHours {
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        if self.closed_weekends && matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let minute = (at.hour() * 60 + at.minute()) as u16;
        if self.open_minute <= self.close_minute {
            minute >= self.open_minute && minute < self.close_minute
        } else {
            // window wraps midnight
            minute >= self.open_minute || minute < self.close_minute
        }
    }
}

/// a priced currency: either a synthetic's underlying or its collateral
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub feed_id: FeedId,
    /// set for underlyings with defined market hours (e.g. equities)
    pub trading_hours: Option<TradingHours>,
}

/// asset lifecycle phase, derived from the clock and the settle price
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetPhase {
    /// minting open, before expiration
    Active,
    /// past expiration, settle price not yet recorded
    Expired,
    /// settle price recorded; only close/redeem remain
    Settled,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidAssetConfig {
    #[error("ltv parameters must satisfy 0 < max_ltv < liquidation_threshold <= precision")]
    LtvBounds,
    #[error("currency and collateral must differ")]
    SelfCollateralized,
}

/// a synthetic futures asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// address of the synthetic debt token
    pub id: Address,
    /// the underlying the synthetic tracks
    pub currency: Currency,
    /// the backing collateral
    pub collateral: Currency,
    /// unix seconds after which minting stops
    pub expiration: u64,
    /// scaled by `ltv_precision`
    pub max_ltv: u32,
    /// scaled by `ltv_precision`
    pub liquidation_threshold: u32,
    /// debt floor in raw units, 0 for none
    pub min_debt: u128,
    pub ltv_precision: u32,
    /// collateral per debt unit at 18 decimals; 0 until settled
    pub settle_price: u128,
}

impl Asset {
    /// check the risk-parameter invariant; indexed data is validated
    /// before it enters a snapshot
    pub fn validate(&self) -> Result<(), InvalidAssetConfig> {
        let ok = self.max_ltv > 0
            && self.max_ltv < self.liquidation_threshold
            && self.liquidation_threshold <= self.ltv_precision;
        if !ok {
            return Err(InvalidAssetConfig::LtvBounds);
        }
        if self.currency.address == self.collateral.address {
            return Err(InvalidAssetConfig::SelfCollateralized);
        }
        Ok(())
    }

    pub fn phase(&self, now: u64) -> AssetPhase {
        if self.settle_price > 0 {
            AssetPhase::Settled
        } else if now >= self.expiration {
            AssetPhase::Expired
        } else {
            AssetPhase::Active
        }
    }

    pub fn max_ltv_percent(&self) -> Decimal {
        risk::ltv_percent(self.max_ltv, self.ltv_precision)
    }

    pub fn liquidation_threshold_percent(&self) -> Decimal {
        risk::ltv_percent(self.liquidation_threshold, self.ltv_precision)
    }

    /// collateral received for redeeming `amount` of the synthetic at
    /// the recorded settle price
    pub fn redeem_proceeds(&self, amount: u128) -> u128 {
        risk::settle_proceeds(
            amount,
            self.currency.decimals,
            self.settle_price,
            self.collateral.decimals,
        )
    }
}

/// a user's collateralized debt position in one asset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user: Address,
    pub asset_id: Address,
    pub collateral_amount: u128,
    pub debt_amount: u128,
    /// cost basis of the synthetic exposure; display only, never risk
    pub average_price: Decimal,
}

impl Position {
    pub fn empty(user: Address, asset_id: Address) -> Self {
        Self {
            user,
            asset_id,
            collateral_amount: 0,
            debt_amount: 0,
            average_price: Decimal::ZERO,
        }
    }

    /// a position with nothing left in it no longer exists on chain
    pub fn is_terminal(&self) -> bool {
        self.debt_amount == 0 && self.collateral_amount == 0
    }

    /// unrealized pnl of the synthetic exposure against its cost basis
    pub fn unrealized_pnl(&self, asset: &Asset, current_price: Decimal) -> Decimal {
        let units = risk::to_decimal(self.debt_amount, asset.currency.decimals);
        (current_price - self.average_price).saturating_mul(units)
    }

    /// collateral left over after a post-settlement close burns the
    /// debt at the settle price
    pub fn close_proceeds(&self, asset: &Asset) -> u128 {
        let owed = asset.redeem_proceeds(self.debt_amount);
        self.collateral_amount.saturating_sub(owed)
    }
}

/// feed id -> latest price snapshot
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSet(pub HashMap<FeedId, Decimal>);

impl PriceSet {
    pub fn get(&self, feed: FeedId) -> Option<Decimal> {
        self.0.get(&feed).copied()
    }

    /// missing feeds read as zero, which every risk function treats as
    /// "oracle unavailable"
    pub fn price_or_zero(&self, feed: FeedId) -> Decimal {
        self.get(feed).unwrap_or(Decimal::ZERO)
    }

    pub fn insert(&mut self, feed: FeedId, price: Decimal) {
        self.0.insert(feed, price);
    }
}

/// risk view of a position at current prices; recomputed on demand
#[derive(Clone, Debug, PartialEq)]
pub struct PositionHealth {
    pub ltv: Decimal,
    pub liquidation_price: Decimal,
    pub max_loanable_amount: u128,
    pub min_collateral_amount: u128,
    /// collateral that could be withdrawn while staying under max ltv
    pub max_withdrawable_collateral: u128,
}

impl PositionHealth {
    pub fn derive(asset: &Asset, position: &Position, prices: &PriceSet) -> Self {
        let debt_price = prices.price_or_zero(asset.currency.feed_id);
        let collateral_price = prices.price_or_zero(asset.collateral.feed_id);

        let ltv = risk::ltv(
            asset.currency.decimals,
            debt_price,
            position.debt_amount,
            asset.collateral.decimals,
            collateral_price,
            position.collateral_amount,
        );
        let liquidation_price = risk::liquidation_price(
            asset.currency.decimals,
            position.debt_amount,
            asset.collateral.decimals,
            collateral_price,
            position.collateral_amount,
            asset.liquidation_threshold,
            asset.ltv_precision,
        );
        let max_loanable_amount = risk::max_loanable_amount(
            asset.currency.decimals,
            debt_price,
            asset.collateral.decimals,
            collateral_price,
            position.collateral_amount,
            asset.max_ltv,
            asset.ltv_precision,
        );
        let min_collateral_amount = risk::min_collateral_amount(
            asset.currency.decimals,
            debt_price,
            position.debt_amount,
            asset.collateral.decimals,
            collateral_price,
            asset.max_ltv,
            asset.ltv_precision,
        );
        let max_withdrawable_collateral =
            position.collateral_amount.saturating_sub(min_collateral_amount);

        Self {
            ltv,
            liquidation_price,
            max_loanable_amount,
            min_collateral_amount,
            max_withdrawable_collateral,
        }
    }
}

/// format raw units with decimals for confirmation text
pub fn format_units(raw: u128, decimals: u8) -> String {
    let divisor = 10u128.pow(decimals.min(38) as u32);
    let whole = raw / divisor;
    let frac = raw % divisor;
    if decimals == 0 {
        return whole.to_string();
    }
    let s = format!("{}.{:0>width$}", whole, frac, width = decimals as usize);
    // trim trailing zeros but keep at least two fractional digits
    let trimmed = s.trim_end_matches('0');
    let min_len = s.find('.').unwrap_or(0) + 3;
    s[..trimmed.len().max(min_len).min(s.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn feed(n: u8) -> FeedId {
        FeedId([n; 32])
    }

    fn currency(n: u8, decimals: u8, hours: Option<TradingHours>) -> Currency {
        Currency {
            address: Address([n; 20]),
            symbol: format!("TOK{n}"),
            decimals,
            feed_id: feed(n),
            trading_hours: hours,
        }
    }

    fn asset() -> Asset {
        Asset {
            id: Address([0xaa; 20]),
            currency: currency(1, 18, None),
            collateral: currency(2, 6, None),
            expiration: 1_700_000_000,
            max_ltv: 700_000,
            liquidation_threshold: 800_000,
            min_debt: 0,
            ltv_precision: 1_000_000,
            settle_price: 0,
        }
    }

    #[test]
    fn address_round_trips_through_hex() {
        let a: Address = "0x00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(a.to_string(), "0x00112233445566778899aabbccddeeff00112233");
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn phase_follows_clock_then_settle_price() {
        let mut a = asset();
        assert_eq!(a.phase(a.expiration - 1), AssetPhase::Active);
        assert_eq!(a.phase(a.expiration), AssetPhase::Expired);
        a.settle_price = 1_000_000_000_000_000_000;
        // a recorded settle price wins regardless of the clock
        assert_eq!(a.phase(0), AssetPhase::Settled);
    }

    #[test]
    fn invalid_ltv_bounds_are_rejected() {
        let mut a = asset();
        a.max_ltv = a.liquidation_threshold;
        assert_eq!(a.validate(), Err(InvalidAssetConfig::LtvBounds));
        a.max_ltv = 0;
        assert_eq!(a.validate(), Err(InvalidAssetConfig::LtvBounds));
        assert!(asset().validate().is_ok());
    }

    #[test]
    fn trading_hours_respect_utc_window() {
        let hours = TradingHours {
            open_minute: 13 * 60 + 30, // 13:30
            close_minute: 20 * 60,     // 20:00
            closed_weekends: true,
        };
        let open = Utc.with_ymd_and_hms(2024, 1, 3, 14, 0, 0).unwrap(); // wednesday
        let before = Utc.with_ymd_and_hms(2024, 1, 3, 13, 0, 0).unwrap();
        let weekend = Utc.with_ymd_and_hms(2024, 1, 6, 14, 0, 0).unwrap(); // saturday
        assert!(hours.is_open_at(open));
        assert!(!hours.is_open_at(before));
        assert!(!hours.is_open_at(weekend));
    }

    #[test]
    fn trading_hours_can_wrap_midnight() {
        let hours = TradingHours {
            open_minute: 22 * 60,
            close_minute: 4 * 60,
            closed_weekends: false,
        };
        let late = Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 3, 3, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        assert!(hours.is_open_at(late));
        assert!(hours.is_open_at(early));
        assert!(!hours.is_open_at(midday));
    }

    #[test]
    fn health_is_consistent_with_risk_math() {
        let a = asset();
        let mut prices = PriceSet::default();
        prices.insert(a.currency.feed_id, Decimal::from(150));
        prices.insert(a.collateral.feed_id, Decimal::ONE);

        let position = Position {
            user: Address([1; 20]),
            asset_id: a.id,
            collateral_amount: 1_000_000_000, // 1,000 units at 6 decimals
            debt_amount: 0,
            average_price: Decimal::ZERO,
        };
        let health = PositionHealth::derive(&a, &position, &prices);
        assert_eq!(health.ltv, Decimal::ZERO);
        assert_eq!(health.liquidation_price, Decimal::ZERO);
        assert_eq!(health.max_loanable_amount, 4_666_666_666_666_666_666);
        // no debt: everything is withdrawable
        assert_eq!(health.max_withdrawable_collateral, position.collateral_amount);
    }

    #[test]
    fn close_proceeds_deduct_settled_debt() {
        let mut a = asset();
        a.settle_price = 171_500_000_000_000_000_000; // 171.5 collateral per debt unit
        let position = Position {
            user: Address([1; 20]),
            asset_id: a.id,
            collateral_amount: 1_000_000_000,
            debt_amount: 2_500_000_000_000_000_000, // 2.5 debt units
            average_price: Decimal::ZERO,
        };
        // 2.5 * 171.5 = 428.75 collateral owed
        assert_eq!(position.close_proceeds(&a), 1_000_000_000 - 428_750_000);
    }

    #[test]
    fn format_units_is_stable_for_display() {
        assert_eq!(format_units(1_500_000, 6), "1.50");
        assert_eq!(format_units(1_234_567, 6), "1.234567");
        assert_eq!(format_units(42, 0), "42");
    }
}
