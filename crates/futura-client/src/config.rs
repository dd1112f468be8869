//! engine configuration and deployment presets
//!
//! constructed once per process and passed by reference; there is no
//! module-level mutable state anywhere in the engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Address;

/// deployment-wide configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// vault-manager contract
    pub vault_address: Address,
    /// hermes-style oracle HTTP endpoint
    pub oracle_endpoint: String,
    /// positions/balances/indexer poll cadence, seconds
    pub position_poll_secs: u64,
    /// price poll cadence, seconds
    pub price_poll_secs: u64,
    /// forced expiry for pending entries, seconds
    pub pending_expiry_secs: u64,
    /// directory for the persisted pending queue and tx history
    pub storage_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vault_address: Address::default(),
            oracle_endpoint: "https://hermes.pyth.network".into(),
            position_poll_secs: 3,
            price_poll_secs: 2,
            pending_expiry_secs: 30 * 60,
            storage_dir: PathBuf::from(".futura"),
        }
    }
}

/// vault manager, mainnet
const MAINNET_VAULT: [u8; 20] = [
    0x5e, 0xf9, 0xa3, 0xbc, 0x6e, 0xfb, 0xb8, 0x2b, 0xc9, 0xa1, 0xe8, 0x3b, 0x71, 0xa7, 0xa7,
    0xa1, 0xe0, 0xf3, 0xc0, 0xde,
];

/// vault manager, public testnet
const TESTNET_VAULT: [u8; 20] = [
    0x1d, 0x22, 0xf0, 0xe2, 0xf0, 0x29, 0x9d, 0x5f, 0x87, 0x4b, 0x4a, 0x67, 0xfd, 0x04, 0x73,
    0x9a, 0x28, 0xa2, 0xb0, 0xc4,
];

impl EngineConfig {
    /// mainnet deployment
    pub fn mainnet() -> Self {
        Self {
            vault_address: Address(MAINNET_VAULT),
            ..Self::default()
        }
    }

    /// public testnet deployment
    pub fn testnet() -> Self {
        Self {
            vault_address: Address(TESTNET_VAULT),
            oracle_endpoint: "https://hermes-beta.pyth.network".into(),
            ..Self::default()
        }
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_secs(self.position_poll_secs.max(1))
    }

    pub fn price_poll_interval(&self) -> Duration {
        Duration::from_secs(self.price_poll_secs.max(1))
    }

    pub fn pending_expiry(&self) -> Duration {
        Duration::from_secs(self.pending_expiry_secs)
    }
}
