//! futura-client: client engine for collateralized synthetic futures
//!
//! mirrors the vault-manager contract's risk checks so a transaction is
//! known safe before it is submitted. the engine decides how much can
//! be borrowed, what confirmation text to show, whether the underlying
//! market is open, and keeps the UI consistent while the indexer lags
//! behind the chain.
//!
//! ## flow
//!
//! ```text
//! Snapshot {assets, positions, prices}
//!   -> PositionHealth (risk math)
//!   -> PositionManager::plan_* (validate, derive deltas)
//!   -> TxBuilder (oracle payload + fee + multicall + gas ceiling)
//!   -> VaultApi::submit
//!   -> PendingTracker (until the indexer catches up)
//! ```
//!
//! wallet connection and signing live behind [`chain::VaultApi`]; this
//! crate never holds keys.

pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod model;
pub mod oracle;
pub mod orchestrator;
pub mod pending;
pub mod sync;

pub use builder::{ConfirmationSummary, TxBuilder, BUNDLE_GAS_LIMIT, SINGLE_LEG_GAS_LIMIT};
pub use chain::{IndexerApi, PlannedTx, Receipt, SimulationOutcome, VaultApi, VaultCall};
pub use config::EngineConfig;
pub use error::{ClientError, Result};
pub use model::{
    Address, Asset, AssetPhase, Currency, FeedId, Position, PositionHealth, PriceSet,
    TradingHours, TxHash,
};
pub use oracle::{HermesOracle, OracleApi};
pub use orchestrator::{
    ActionPlan, ExecuteResult, MarketGate, PositionManager, PositionState, ValidationError,
};
pub use pending::{
    ActionKind, JsonFileStore, MemoryStore, PendingAction, PendingStore, PendingTracker,
    TxRecord, TxRecordStatus,
};
pub use sync::{Poller, Snapshot, SnapshotStore};
