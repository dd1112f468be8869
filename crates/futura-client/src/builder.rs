//! transaction building
//!
//! turns planned action legs into the concrete atomic bundle: fetch the
//! oracle update payload, price its fee, prepend the oracle call, pick
//! the gas ceiling. gas is a fixed conservative ceiling per bundle
//! shape, not an estimate: estimation against momentarily stale oracle
//! state is unreliable.

use std::fmt;
use std::sync::Arc;

use crate::chain::{PlannedTx, VaultApi, VaultCall};
use crate::error::{ClientError, Result};
use crate::model::FeedId;
use crate::oracle::OracleApi;

/// ceiling for a lone vault call
pub const SINGLE_LEG_GAS_LIMIT: u64 = 1_000_000;

/// ceiling for oracle-bundled and multi-leg calls
pub const BUNDLE_GAS_LIMIT: u64 = 5_000_000;

/// human-readable confirmation for a planned action
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationSummary {
    pub title: String,
    pub lines: Vec<(String, String)>,
}

impl fmt::Display for ConfirmationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for (label, value) in &self.lines {
            writeln!(f, "  {label}: {value}")?;
        }
        Ok(())
    }
}

/// builds submittable bundles from action legs
pub struct TxBuilder {
    oracle: Arc<dyn OracleApi>,
    vault: Arc<dyn VaultApi>,
}

impl TxBuilder {
    pub fn new(oracle: Arc<dyn OracleApi>, vault: Arc<dyn VaultApi>) -> Self {
        Self { oracle, vault }
    }

    /// bundle the legs with a fresh oracle update for `feeds`
    ///
    /// an empty `feeds` list means the action is price-independent
    /// (settled assets) and no oracle call is prepended.
    pub async fn build(&self, legs: Vec<VaultCall>, feeds: &[FeedId]) -> Result<PlannedTx> {
        if legs.is_empty() {
            return Err(ClientError::Chain("refusing to build an empty bundle".into()));
        }

        if feeds.is_empty() {
            let gas_limit = gas_ceiling(legs.len());
            return Ok(PlannedTx { calls: legs, value: 0, gas_limit });
        }

        let payload = self.oracle.price_update_data(feeds).await?;
        if payload.is_empty() || payload.iter().all(|blob| blob.is_empty()) {
            return Err(ClientError::EmptyUpdateData);
        }
        let fee = self.vault.update_fee(&payload).await?;
        tracing::debug!(fee, legs = legs.len(), "bundling oracle update");

        let mut calls = Vec::with_capacity(legs.len() + 1);
        calls.push(VaultCall::UpdateOracle { payload });
        calls.extend(legs);

        let gas_limit = gas_ceiling(calls.len());
        Ok(PlannedTx { calls, value: fee, gas_limit })
    }
}

fn gas_ceiling(call_count: usize) -> u64 {
    if call_count > 1 {
        BUNDLE_GAS_LIMIT
    } else {
        SINGLE_LEG_GAS_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Receipt, SimulationOutcome};
    use crate::model::{Address, TxHash};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubOracle {
        blobs: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl OracleApi for StubOracle {
        async fn price_update_data(&self, _feeds: &[FeedId]) -> Result<Vec<Vec<u8>>> {
            Ok(self.blobs.clone())
        }

        async fn latest_prices(&self, _feeds: &[FeedId]) -> Result<crate::model::PriceSet> {
            Ok(crate::model::PriceSet::default())
        }
    }

    struct StubVault {
        fee: u128,
        fee_queries: Mutex<u32>,
    }

    #[async_trait]
    impl VaultApi for StubVault {
        async fn update_fee(&self, _payload: &[Vec<u8>]) -> Result<u128> {
            *self.fee_queries.lock().unwrap() += 1;
            Ok(self.fee)
        }

        async fn simulate(&self, _from: Address, _tx: &PlannedTx) -> Result<SimulationOutcome> {
            Ok(SimulationOutcome::Ok)
        }

        async fn submit(&self, _from: Address, _tx: &PlannedTx) -> Result<TxHash> {
            Ok(TxHash::default())
        }

        async fn wait_for_inclusion(&self, hash: TxHash) -> Result<Receipt> {
            Ok(Receipt { tx_hash: hash, block_number: 1, success: true })
        }
    }

    fn builder(blobs: Vec<Vec<u8>>, fee: u128) -> TxBuilder {
        TxBuilder::new(
            Arc::new(StubOracle { blobs }),
            Arc::new(StubVault { fee, fee_queries: Mutex::new(0) }),
        )
    }

    fn mint_leg() -> VaultCall {
        VaultCall::Mint { asset: Address([1; 20]), amount: 5 }
    }

    #[tokio::test]
    async fn oracle_update_rides_first_with_the_fee_attached() {
        let b = builder(vec![vec![0xde, 0xad]], 77);
        let tx = b.build(vec![mint_leg()], &[FeedId([1; 32])]).await.unwrap();

        assert_eq!(tx.value, 77);
        assert_eq!(tx.calls.len(), 2);
        assert!(matches!(tx.calls[0], VaultCall::UpdateOracle { .. }));
        assert_eq!(tx.gas_limit, BUNDLE_GAS_LIMIT);
    }

    #[tokio::test]
    async fn settled_assets_skip_the_oracle() {
        let b = builder(vec![], 77);
        let tx = b
            .build(vec![VaultCall::Close { asset: Address([1; 20]), expected_collateral: 9 }], &[])
            .await
            .unwrap();

        assert_eq!(tx.value, 0);
        assert_eq!(tx.calls.len(), 1);
        assert_eq!(tx.gas_limit, SINGLE_LEG_GAS_LIMIT);
    }

    #[tokio::test]
    async fn empty_update_payload_is_an_error() {
        let b = builder(vec![], 77);
        let err = b.build(vec![mint_leg()], &[FeedId([1; 32])]).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyUpdateData));

        let b = builder(vec![vec![]], 77);
        let err = b.build(vec![mint_leg()], &[FeedId([1; 32])]).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyUpdateData));
    }

    #[tokio::test]
    async fn empty_bundles_are_refused() {
        let b = builder(vec![vec![1]], 0);
        assert!(b.build(vec![], &[]).await.is_err());
    }
}
