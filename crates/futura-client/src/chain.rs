//! vault-manager and indexer boundaries
//!
//! everything chain-specific is decoded once behind these traits. in
//! particular, revert reasons become a typed [`SimulationOutcome`] here
//! and nowhere else; the rest of the engine never pattern-matches on
//! raw error strings.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Address, Asset, Position, TxHash};

/// one logical call into the vault manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VaultCall {
    /// apply a signed oracle price update; must precede any
    /// price-dependent leg in the same bundle
    UpdateOracle { payload: Vec<Vec<u8>> },
    /// add collateral to the caller's position
    Deposit { asset: Address, amount: u128 },
    /// mint synthetic debt against the caller's collateral
    Mint { asset: Address, amount: u128 },
    /// burn synthetic debt
    Burn { asset: Address, amount: u128 },
    /// remove collateral from the caller's position
    Withdraw { asset: Address, amount: u128 },
    /// record the settle price for an expired asset
    Settle { asset: Address },
    /// close a settled position, reclaiming leftover collateral
    Close { asset: Address, expected_collateral: u128 },
    /// burn held synthetic tokens for collateral at the settle price
    Redeem { asset: Address, amount: u128, expected_collateral: u128 },
}

impl VaultCall {
    pub fn label(&self) -> &'static str {
        match self {
            VaultCall::UpdateOracle { .. } => "update oracle",
            VaultCall::Deposit { .. } => "deposit",
            VaultCall::Mint { .. } => "mint",
            VaultCall::Burn { .. } => "burn",
            VaultCall::Withdraw { .. } => "withdraw",
            VaultCall::Settle { .. } => "settle",
            VaultCall::Close { .. } => "close",
            VaultCall::Redeem { .. } => "redeem",
        }
    }
}

/// an atomic multicall ready for simulation or submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedTx {
    pub calls: Vec<VaultCall>,
    /// native value attached, covering the oracle update fee
    pub value: u128,
    pub gas_limit: u64,
}

/// typed result of simulating a planned transaction
///
/// the adapter maps the contract's revert selectors onto these; a
/// selector it does not recognize becomes `Reverted` with the raw
/// reason for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationOutcome {
    Ok,
    /// the underlying market is closed and the oracle refuses staleness
    MarketClosed,
    AlreadySettled,
    NotSettled,
    VaultMissing,
    InsufficientCollateral,
    Reverted(String),
}

/// inclusion receipt for a submitted transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// the vault-manager contract surface
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// fee the oracle contract charges for applying this payload
    async fn update_fee(&self, payload: &[Vec<u8>]) -> Result<u128>;

    /// dry-run the bundle and decode the outcome
    async fn simulate(&self, from: Address, tx: &PlannedTx) -> Result<SimulationOutcome>;

    /// submit the bundle; returns as soon as the wallet accepts it
    async fn submit(&self, from: Address, tx: &PlannedTx) -> Result<TxHash>;

    /// wait for inclusion; unbounded, per the wallet/provider's own
    /// behavior
    async fn wait_for_inclusion(&self, hash: TxHash) -> Result<Receipt>;
}

/// the indexing layer: snapshots plus a freshness watermark
#[async_trait]
pub trait IndexerApi: Send + Sync {
    async fn assets(&self) -> Result<Vec<Asset>>;

    async fn positions(&self, user: Address) -> Result<Vec<Position>>;

    /// wallet balances by token address (collateral and synthetics)
    async fn balances(&self, user: Address) -> Result<HashMap<Address, u128>>;

    /// highest block the indexed data reflects; the reconciler depends
    /// on this advancing
    async fn latest_block(&self) -> Result<u64>;
}
