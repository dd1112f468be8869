//! snapshot store and polling tasks
//!
//! components read immutable snapshots and never mutate shared state;
//! the only writers are the polling tasks here and the pending tracker
//! they drive. each poller owns its interval and its teardown: dropping
//! the handle aborts the tasks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::IndexerApi;
use crate::config::EngineConfig;
use crate::model::{Address, Asset, FeedId, Position, PriceSet};
use crate::oracle::OracleApi;
use crate::pending::PendingTracker;

/// one consistent read of the world, shared read-only
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub assets: Vec<Asset>,
    pub positions: Vec<Position>,
    /// wallet balances by token address
    pub balances: HashMap<Address, u128>,
    pub prices: PriceSet,
    /// indexer freshness watermark
    pub indexed_block: u64,
    /// unix seconds of the last successful refresh
    pub updated_at: i64,
}

impl Snapshot {
    pub fn asset(&self, id: Address) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn position(&self, asset_id: Address) -> Option<&Position> {
        self.positions.iter().find(|p| p.asset_id == asset_id)
    }

    pub fn balance(&self, token: Address) -> u128 {
        self.balances.get(&token).copied().unwrap_or(0)
    }

    fn feed_ids(&self) -> Vec<FeedId> {
        let mut feeds: Vec<FeedId> = self
            .assets
            .iter()
            .flat_map(|a| [a.currency.feed_id, a.collateral.feed_id])
            .collect();
        feeds.sort();
        feeds.dedup();
        feeds
    }
}

/// publishes snapshots to any number of observers
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    /// latest snapshot; cheap, lock-free for readers
    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// subscribe for change notifications
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// read-modify-write publish
    pub fn update(&self, apply: impl FnOnce(&mut Snapshot)) {
        let mut next = (*self.current()).clone();
        apply(&mut next);
        next.updated_at = Utc::now().timestamp();
        self.tx.send_replace(Arc::new(next));
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// independent polling tasks with explicit cancellation
pub struct Poller {
    handles: Vec<JoinHandle<()>>,
}

impl Poller {
    /// spawn the position/balance poll and the price poll
    ///
    /// each indexer tick also reconciles the pending queue against the
    /// fresh watermark.
    pub fn spawn(
        config: &EngineConfig,
        user: Address,
        indexer: Arc<dyn IndexerApi>,
        oracle: Arc<dyn OracleApi>,
        store: SnapshotStore,
        pending: Arc<PendingTracker>,
    ) -> Self {
        let positions_task = {
            let store = store.clone();
            let interval = config.position_poll_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    refresh_indexed(&*indexer, user, &store, &pending).await;
                }
            })
        };

        let prices_task = {
            let store = store.clone();
            let interval = config.price_poll_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    refresh_prices(&*oracle, &store).await;
                }
            })
        };

        Self { handles: vec![positions_task, prices_task] }
    }

    /// stop all tasks
    pub fn shutdown(mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// one indexer tick: assets, positions, balances, watermark, reconcile
///
/// a failed query keeps the previous snapshot; staleness is bounded by
/// the caller's poll interval, not compounded here.
async fn refresh_indexed(
    indexer: &dyn IndexerApi,
    user: Address,
    store: &SnapshotStore,
    pending: &PendingTracker,
) {
    let assets = match indexer.assets().await {
        Ok(assets) => assets,
        Err(e) => {
            tracing::debug!("asset refresh failed: {e}");
            return;
        }
    };
    let assets: Vec<Asset> = assets
        .into_iter()
        .filter(|a| match a.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("dropping misconfigured asset {}: {e}", a.id);
                false
            }
        })
        .collect();

    let positions = match indexer.positions(user).await {
        Ok(positions) => positions,
        Err(e) => {
            tracing::debug!("position refresh failed: {e}");
            return;
        }
    };
    let balances = match indexer.balances(user).await {
        Ok(balances) => balances,
        Err(e) => {
            tracing::debug!("balance refresh failed: {e}");
            return;
        }
    };
    let indexed_block = match indexer.latest_block().await {
        Ok(block) => block,
        Err(e) => {
            tracing::debug!("watermark refresh failed: {e}");
            return;
        }
    };

    store.update(|snapshot| {
        snapshot.assets = assets;
        snapshot.positions = positions;
        snapshot.balances = balances;
        snapshot.indexed_block = indexed_block;
    });
    pending.reconcile(indexed_block);
}

/// one price tick for every feed the current asset list references
async fn refresh_prices(oracle: &dyn OracleApi, store: &SnapshotStore) {
    let feeds = store.current().feed_ids();
    if feeds.is_empty() {
        return;
    }
    match oracle.latest_prices(&feeds).await {
        Ok(prices) => store.update(|snapshot| snapshot.prices = prices),
        Err(e) => tracing::debug!("price refresh failed: {e}"),
    }
}
