//! position lifecycle orchestration
//!
//! every user action flows through two stages. planning is pure and
//! synchronous: it validates the deltas against the same rules the
//! vault contract enforces and produces the legs, the feeds to refresh
//! and the confirmation text. execution is async: it builds the bundle,
//! simulates it, submits it and records the pending entry. execution
//! never throws past its boundary; internal failures are logged and
//! resolved to [`ExecuteResult::NotSubmitted`] so calling UI code has
//! no partial state to unwind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futura_risk as risk;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::builder::{ConfirmationSummary, TxBuilder};
use crate::chain::{SimulationOutcome, VaultApi, VaultCall};
use crate::model::{
    format_units, Address, Asset, AssetPhase, FeedId, Position, PositionHealth, PriceSet, TxHash,
};
use crate::oracle::OracleApi;
use crate::pending::{ActionKind, PendingTracker};

/// absorbs decimal noise when comparing a projected ltv against the
/// configured limit; one part in 1e9 of a percent
fn ltv_epsilon() -> Decimal {
    Decimal::new(1, 9)
}

/// why a draft action cannot be submitted; rendered as disabled-action
/// text, never raised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("asset is no longer active")]
    AssetNotActive,

    #[error("asset has not expired yet")]
    NotExpired,

    #[error("asset is already settled")]
    AlreadySettled,

    #[error("asset is not settled yet")]
    NotSettled,

    #[error("cannot repay more than the outstanding debt")]
    RepayExceedsDebt,

    #[error("cannot withdraw more collateral than deposited")]
    InsufficientCollateral,

    #[error("amount out of range")]
    AmountOverflow,

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },

    #[error("remaining debt {remaining} is below the minimum of {min_debt}")]
    BelowMinDebt { remaining: u128, min_debt: u128 },

    #[error("resulting position would exceed the maximum ltv")]
    ExceedsMaxLtv,

    #[error("price data unavailable")]
    PriceUnavailable,

    #[error("position has outstanding debt")]
    DebtOutstanding,
}

/// advisory/authoritative market-hours verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketGate {
    Open,
    /// the local clock says the underlying's market is closed
    ClosedLocalClock,
    /// simulation says the oracle refuses to update; authoritative
    ClosedOnchain,
}

/// result of executing a plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecuteResult {
    Submitted(TxHash),
    /// a simulation-detected business condition; show a blocking notice
    Blocked(SimulationOutcome),
    /// an internal failure, already logged; nothing was submitted
    NotSubmitted,
}

impl ExecuteResult {
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            ExecuteResult::Submitted(hash) => Some(*hash),
            _ => None,
        }
    }
}

/// client-side view of the per-(asset, user) state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionState {
    NoPosition,
    Open,
    /// a submitted action is not yet reflected by the indexer
    AdjustPending,
    Closed,
}

/// a validated action ready to build and submit
#[derive(Clone, Debug)]
pub struct ActionPlan {
    pub kind: ActionKind,
    pub asset_id: Address,
    /// pending-queue key
    pub debt_currency: Address,
    pub collateral_delta: i128,
    pub debt_delta: i128,
    pub legs: Vec<VaultCall>,
    /// feeds to refresh in the bundle; empty for settled assets
    pub feeds: Vec<FeedId>,
    /// projected risk view after the action, where prices allow one
    pub projected: Option<PositionHealth>,
    pub summary: ConfirmationSummary,
}

/// sequences user actions against one vault deployment
pub struct PositionManager {
    user: Address,
    vault: Arc<dyn VaultApi>,
    builder: TxBuilder,
    pending: Arc<PendingTracker>,
}

impl PositionManager {
    pub fn new(
        user: Address,
        vault: Arc<dyn VaultApi>,
        oracle: Arc<dyn OracleApi>,
        pending: Arc<PendingTracker>,
    ) -> Self {
        let builder = TxBuilder::new(oracle, vault.clone());
        Self { user, vault, builder, pending }
    }

    pub fn user(&self) -> Address {
        self.user
    }

    /// state-machine view for the UI
    pub fn position_state(&self, asset: &Asset, position: Option<&Position>) -> PositionState {
        if self.pending.is_pending(asset.currency.address) {
            return PositionState::AdjustPending;
        }
        match position {
            None => PositionState::NoPosition,
            Some(p) if p.is_terminal() => PositionState::Closed,
            Some(_) => PositionState::Open,
        }
    }

    /// validate a collateral/debt adjustment and derive its plan
    ///
    /// positive deltas deposit/mint, negative repay/withdraw. the
    /// min-debt floor and max-ltv ceiling mirror the vault contract's
    /// own checks so a valid plan does not revert on-chain.
    pub fn plan_adjust(
        &self,
        asset: &Asset,
        position: &Position,
        prices: &PriceSet,
        wallet_balance: u128,
        collateral_delta: i128,
        debt_delta: i128,
        now: u64,
    ) -> Result<ActionPlan, ValidationError> {
        if collateral_delta == 0 && debt_delta == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if asset.phase(now) != AssetPhase::Active {
            return Err(ValidationError::AssetNotActive);
        }

        let new_debt = apply_delta(position.debt_amount, debt_delta).ok_or_else(|| {
            if debt_delta < 0 {
                ValidationError::RepayExceedsDebt
            } else {
                ValidationError::AmountOverflow
            }
        })?;
        let new_collateral =
            apply_delta(position.collateral_amount, collateral_delta).ok_or_else(|| {
                if collateral_delta < 0 {
                    ValidationError::InsufficientCollateral
                } else {
                    ValidationError::AmountOverflow
                }
            })?;

        if collateral_delta > 0 {
            let need = collateral_delta.unsigned_abs();
            if wallet_balance < need {
                return Err(ValidationError::InsufficientBalance { have: wallet_balance, need });
            }
        }

        if new_debt > 0 && new_debt < asset.min_debt {
            return Err(ValidationError::BelowMinDebt {
                remaining: new_debt,
                min_debt: asset.min_debt,
            });
        }

        let debt_price = prices.price_or_zero(asset.currency.feed_id);
        let collateral_price = prices.price_or_zero(asset.collateral.feed_id);
        let increases_risk = debt_delta > 0 || collateral_delta < 0;

        if increases_risk {
            if debt_price <= Decimal::ZERO || collateral_price <= Decimal::ZERO {
                return Err(ValidationError::PriceUnavailable);
            }
            // the same flooring the borrow-limit derivation uses, so
            // client acceptance and contract enforcement agree exactly
            let loanable = risk::max_loanable_amount(
                asset.currency.decimals,
                debt_price,
                asset.collateral.decimals,
                collateral_price,
                new_collateral,
                asset.max_ltv,
                asset.ltv_precision,
            );
            if new_debt > loanable {
                return Err(ValidationError::ExceedsMaxLtv);
            }
        }

        let projected_position = Position {
            collateral_amount: new_collateral,
            debt_amount: new_debt,
            ..position.clone()
        };
        let projected = PositionHealth::derive(asset, &projected_position, prices);
        debug_assert!(
            !increases_risk || projected.ltv <= asset.max_ltv_percent() + ltv_epsilon(),
            "accepted a plan over the max ltv"
        );

        let mut legs = Vec::new();
        if collateral_delta > 0 {
            legs.push(VaultCall::Deposit {
                asset: asset.id,
                amount: collateral_delta.unsigned_abs(),
            });
        }
        if debt_delta < 0 {
            legs.push(VaultCall::Burn { asset: asset.id, amount: debt_delta.unsigned_abs() });
        }
        if debt_delta > 0 {
            legs.push(VaultCall::Mint { asset: asset.id, amount: debt_delta.unsigned_abs() });
        }
        if collateral_delta < 0 {
            legs.push(VaultCall::Withdraw {
                asset: asset.id,
                amount: collateral_delta.unsigned_abs(),
            });
        }

        let kind = if debt_delta > 0 {
            ActionKind::Borrow
        } else if debt_delta < 0 {
            ActionKind::Repay
        } else if collateral_delta > 0 {
            ActionKind::AddCollateral
        } else {
            ActionKind::RemoveCollateral
        };

        let summary = adjust_summary(kind, asset, collateral_delta, debt_delta, Some(&projected));
        Ok(ActionPlan {
            kind,
            asset_id: asset.id,
            debt_currency: asset.currency.address,
            collateral_delta,
            debt_delta,
            legs,
            feeds: vec![asset.currency.feed_id, asset.collateral.feed_id],
            projected: Some(projected),
            summary,
        })
    }

    /// derive the debt delta that moves the position to a target ltv
    pub fn plan_to_target_ltv(
        &self,
        asset: &Asset,
        position: &Position,
        prices: &PriceSet,
        target_ltv_percent: Decimal,
        now: u64,
    ) -> Result<ActionPlan, ValidationError> {
        let debt_price = prices.price_or_zero(asset.currency.feed_id);
        let collateral_price = prices.price_or_zero(asset.collateral.feed_id);
        if debt_price <= Decimal::ZERO || collateral_price <= Decimal::ZERO {
            return Err(ValidationError::PriceUnavailable);
        }

        let collateral_value = risk::value_of(
            position.collateral_amount,
            asset.collateral.decimals,
            collateral_price,
        );
        let target_value = collateral_value
            .saturating_mul(target_ltv_percent.max(Decimal::ZERO))
            .checked_div(Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ZERO);
        let desired_units = target_value.checked_div(debt_price).unwrap_or(Decimal::ZERO);
        let desired_raw =
            risk::from_decimal(desired_units, asset.currency.decimals, risk::Rounding::Down);

        let current = i128::try_from(position.debt_amount).unwrap_or(i128::MAX);
        let desired = i128::try_from(desired_raw).unwrap_or(i128::MAX);
        self.plan_adjust(asset, position, prices, 0, 0, desired - current, now)
    }

    /// full close in one bundle: burn all debt, withdraw all collateral
    ///
    /// bypasses the min-debt floor; closing to zero is always allowed.
    pub fn plan_repay_all(
        &self,
        asset: &Asset,
        position: &Position,
        prices: &PriceSet,
        now: u64,
    ) -> Result<ActionPlan, ValidationError> {
        if position.is_terminal() {
            return Err(ValidationError::ZeroAmount);
        }
        if asset.phase(now) != AssetPhase::Active {
            return Err(ValidationError::AssetNotActive);
        }

        let mut legs = Vec::new();
        if position.debt_amount > 0 {
            legs.push(VaultCall::Burn { asset: asset.id, amount: position.debt_amount });
        }
        if position.collateral_amount > 0 {
            legs.push(VaultCall::Withdraw { asset: asset.id, amount: position.collateral_amount });
        }

        let emptied = Position { collateral_amount: 0, debt_amount: 0, ..position.clone() };
        let projected = PositionHealth::derive(asset, &emptied, prices);
        let collateral_delta = -i128::try_from(position.collateral_amount).unwrap_or(i128::MAX);
        let debt_delta = -i128::try_from(position.debt_amount).unwrap_or(i128::MAX);
        let summary = adjust_summary(ActionKind::RepayAll, asset, collateral_delta, debt_delta, None);

        Ok(ActionPlan {
            kind: ActionKind::RepayAll,
            asset_id: asset.id,
            debt_currency: asset.currency.address,
            collateral_delta,
            debt_delta,
            legs,
            feeds: vec![asset.currency.feed_id, asset.collateral.feed_id],
            projected: Some(projected),
            summary,
        })
    }

    /// record the settle price for an expired asset
    pub fn plan_settle(&self, asset: &Asset, now: u64) -> Result<ActionPlan, ValidationError> {
        match asset.phase(now) {
            AssetPhase::Active => return Err(ValidationError::NotExpired),
            AssetPhase::Settled => return Err(ValidationError::AlreadySettled),
            AssetPhase::Expired => {}
        }
        let summary = ConfirmationSummary {
            title: format!("settle {}", asset.currency.symbol),
            lines: vec![("asset".into(), asset.id.to_string())],
        };
        Ok(ActionPlan {
            kind: ActionKind::Settle,
            asset_id: asset.id,
            debt_currency: asset.currency.address,
            collateral_delta: 0,
            debt_delta: 0,
            legs: vec![VaultCall::Settle { asset: asset.id }],
            feeds: vec![asset.currency.feed_id, asset.collateral.feed_id],
            projected: None,
            summary,
        })
    }

    /// close a settled position, reclaiming the collateral left after
    /// the debt is burned at the settle price
    pub fn plan_close(
        &self,
        asset: &Asset,
        position: &Position,
        now: u64,
    ) -> Result<ActionPlan, ValidationError> {
        if asset.phase(now) != AssetPhase::Settled {
            return Err(ValidationError::NotSettled);
        }
        if position.is_terminal() {
            return Err(ValidationError::ZeroAmount);
        }
        let expected_collateral = position.close_proceeds(asset);
        let summary = ConfirmationSummary {
            title: format!("close {}", asset.currency.symbol),
            lines: vec![(
                "collateral received".into(),
                format!(
                    "{} {}",
                    format_units(expected_collateral, asset.collateral.decimals),
                    asset.collateral.symbol
                ),
            )],
        };
        Ok(ActionPlan {
            kind: ActionKind::Close,
            asset_id: asset.id,
            debt_currency: asset.currency.address,
            collateral_delta: -i128::try_from(expected_collateral).unwrap_or(i128::MAX),
            debt_delta: -i128::try_from(position.debt_amount).unwrap_or(i128::MAX),
            legs: vec![VaultCall::Close { asset: asset.id, expected_collateral }],
            // the settle price is fixed; no oracle refresh needed
            feeds: Vec::new(),
            projected: None,
            summary,
        })
    }

    /// burn held synthetic tokens for collateral at the settle price
    ///
    /// redemption is for token holders, not position owners, but a
    /// holder with open debt must close that first.
    pub fn plan_redeem(
        &self,
        asset: &Asset,
        amount: u128,
        token_balance: u128,
        open_debt: u128,
        now: u64,
    ) -> Result<ActionPlan, ValidationError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if asset.phase(now) != AssetPhase::Settled {
            return Err(ValidationError::NotSettled);
        }
        if open_debt > 0 {
            return Err(ValidationError::DebtOutstanding);
        }
        if token_balance < amount {
            return Err(ValidationError::InsufficientBalance {
                have: token_balance,
                need: amount,
            });
        }
        let expected_collateral = asset.redeem_proceeds(amount);
        let summary = ConfirmationSummary {
            title: format!("redeem {}", asset.currency.symbol),
            lines: vec![
                (
                    "redeem".into(),
                    format!(
                        "{} {}",
                        format_units(amount, asset.currency.decimals),
                        asset.currency.symbol
                    ),
                ),
                (
                    "collateral received".into(),
                    format!(
                        "{} {}",
                        format_units(expected_collateral, asset.collateral.decimals),
                        asset.collateral.symbol
                    ),
                ),
            ],
        };
        Ok(ActionPlan {
            kind: ActionKind::Redeem,
            asset_id: asset.id,
            debt_currency: asset.currency.address,
            collateral_delta: 0,
            debt_delta: 0,
            legs: vec![VaultCall::Redeem { asset: asset.id, amount, expected_collateral }],
            feeds: Vec::new(),
            projected: None,
            summary,
        })
    }

    /// market-hours gate for risk-increasing plans
    ///
    /// the local clock is advisory; the simulation verdict is
    /// authoritative. simulation problems unrelated to market closure
    /// fail open so a flaky RPC cannot false-block users.
    pub async fn market_gate(&self, asset: &Asset, plan: &ActionPlan) -> MarketGate {
        self.market_gate_at(asset, plan, Utc::now()).await
    }

    async fn market_gate_at(
        &self,
        asset: &Asset,
        plan: &ActionPlan,
        now: DateTime<Utc>,
    ) -> MarketGate {
        if !plan.kind.increases_risk() {
            return MarketGate::Open;
        }
        if let Some(hours) = asset.currency.trading_hours {
            if !hours.is_open_at(now) {
                return MarketGate::ClosedLocalClock;
            }
        }
        match self.builder.build(plan.legs.clone(), &plan.feeds).await {
            Ok(tx) => match self.vault.simulate(self.user, &tx).await {
                Ok(SimulationOutcome::MarketClosed) => MarketGate::ClosedOnchain,
                Ok(_) => MarketGate::Open,
                Err(e) => {
                    tracing::debug!("market gate simulation unavailable ({e}); assuming open");
                    MarketGate::Open
                }
            },
            Err(e) => {
                tracing::debug!("market gate bundle build failed ({e}); assuming open");
                MarketGate::Open
            }
        }
    }

    /// build, simulate, submit; never raises past this boundary
    pub async fn execute(&self, plan: &ActionPlan) -> ExecuteResult {
        match self.try_execute(plan).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("{} not submitted: {e}", plan.kind.label());
                ExecuteResult::NotSubmitted
            }
        }
    }

    async fn try_execute(&self, plan: &ActionPlan) -> crate::error::Result<ExecuteResult> {
        let tx = self.builder.build(plan.legs.clone(), &plan.feeds).await?;

        match self.vault.simulate(self.user, &tx).await {
            Ok(SimulationOutcome::Ok) => {}
            Ok(
                outcome @ (SimulationOutcome::MarketClosed
                | SimulationOutcome::AlreadySettled
                | SimulationOutcome::NotSettled
                | SimulationOutcome::VaultMissing
                | SimulationOutcome::InsufficientCollateral),
            ) => {
                tracing::info!("{} blocked by simulation: {outcome:?}", plan.kind.label());
                return Ok(ExecuteResult::Blocked(outcome));
            }
            // an unrecognized revert or an unreachable simulator is not
            // grounds to block the user; the chain itself will decide
            Ok(SimulationOutcome::Reverted(reason)) => {
                tracing::debug!("simulation reverted ({reason}); proceeding");
            }
            Err(e) => {
                tracing::debug!("simulation unavailable ({e}); proceeding");
            }
        }

        let hash = self.vault.submit(self.user, &tx).await?;
        self.pending.record(plan.kind, plan.debt_currency, hash);
        tracing::info!("submitted {} as {hash}", plan.kind.label());
        self.watch_inclusion(hash);
        Ok(ExecuteResult::Submitted(hash))
    }

    /// detached receipt watcher; feeds the reconciler its inclusion
    /// block or removes the entry on failure
    fn watch_inclusion(&self, hash: TxHash) {
        let vault = self.vault.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            match vault.wait_for_inclusion(hash).await {
                Ok(receipt) if receipt.success => {
                    pending.set_inclusion_block(hash, receipt.block_number);
                }
                Ok(_) => {
                    tracing::warn!("transaction {hash} reverted on chain");
                    pending.mark_failed(hash);
                }
                Err(e) => {
                    tracing::warn!("no receipt for {hash}: {e}");
                }
            }
        });
    }
}

fn apply_delta(amount: u128, delta: i128) -> Option<u128> {
    if delta >= 0 {
        amount.checked_add(delta as u128)
    } else {
        amount.checked_sub(delta.unsigned_abs())
    }
}

fn adjust_summary(
    kind: ActionKind,
    asset: &Asset,
    collateral_delta: i128,
    debt_delta: i128,
    projected: Option<&PositionHealth>,
) -> ConfirmationSummary {
    let mut lines = Vec::new();
    if collateral_delta != 0 {
        let sign = if collateral_delta > 0 { "+" } else { "-" };
        lines.push((
            "collateral".into(),
            format!(
                "{sign}{} {}",
                format_units(collateral_delta.unsigned_abs(), asset.collateral.decimals),
                asset.collateral.symbol
            ),
        ));
    }
    if debt_delta != 0 {
        let sign = if debt_delta > 0 { "+" } else { "-" };
        lines.push((
            "debt".into(),
            format!(
                "{sign}{} {}",
                format_units(debt_delta.unsigned_abs(), asset.currency.decimals),
                asset.currency.symbol
            ),
        ));
    }
    if let Some(health) = projected {
        lines.push(("projected ltv".into(), format!("{}%", health.ltv.round_dp(2))));
        if health.liquidation_price > Decimal::ZERO {
            lines.push((
                "liquidation price".into(),
                format!("${}", health.liquidation_price.round_dp(2)),
            ));
        }
    }
    ConfirmationSummary { title: format!("{} {}", kind.label(), asset.currency.symbol), lines }
}
