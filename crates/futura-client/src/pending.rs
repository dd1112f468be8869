//! pending-state reconciliation
//!
//! a submitted transaction is visible on chain before the indexer has
//! caught up; without this queue the UI would flicker between stale and
//! fresh position data. entries live until the indexer's watermark
//! passes the inclusion block, the transaction is known to have failed,
//! or a forced expiry fires. the queue survives reloads through a
//! storage backend but is never a source of truth for settlement math.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::model::{Address, TxHash};

/// what kind of action a pending entry is waiting on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Borrow,
    Repay,
    RepayAll,
    AddCollateral,
    RemoveCollateral,
    Settle,
    Close,
    Redeem,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Borrow => "borrow",
            ActionKind::Repay => "repay",
            ActionKind::RepayAll => "repay all",
            ActionKind::AddCollateral => "add collateral",
            ActionKind::RemoveCollateral => "remove collateral",
            ActionKind::Settle => "settle",
            ActionKind::Close => "close",
            ActionKind::Redeem => "redeem",
        }
    }

    /// whether this action can grow the position's risk; these are the
    /// actions behind the market-hours gate
    pub fn increases_risk(&self) -> bool {
        matches!(self, ActionKind::Borrow | ActionKind::RemoveCollateral)
    }
}

/// an in-flight (action, debt-currency) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: ActionKind,
    /// debt currency the action touches
    pub currency: Address,
    pub tx_hash: TxHash,
    /// unix seconds at submission
    pub submitted_at: i64,
    /// set once the receipt arrives
    pub inclusion_block: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxRecordStatus {
    Pending,
    Confirmed,
    Failed,
}

/// history record kept alongside the queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: TxHash,
    pub kind: ActionKind,
    pub currency: Address,
    pub status: TxRecordStatus,
    pub block_number: Option<u64>,
    pub submitted_at: i64,
}

/// durable backend for the queue and history
pub trait PendingStore: Send + Sync {
    fn load(&self, user: Address) -> Result<Vec<PendingAction>>;
    fn save(&self, user: Address, entries: &[PendingAction]) -> Result<()>;
    fn load_history(&self, user: Address) -> Result<Vec<TxRecord>>;
    fn save_history(&self, user: Address, records: &[TxRecord]) -> Result<()>;
}

/// json documents under a configurable directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn queue_path(&self, user: Address) -> PathBuf {
        self.dir
            .join(format!("pending-futures-positions-currencies-for-{user}.json"))
    }

    fn history_path(&self, user: Address) -> PathBuf {
        self.dir.join(format!("futures-transactions-for-{user}.json"))
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, path: PathBuf) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write<T: Serialize>(&self, path: PathBuf, items: &[T]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string(items)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

impl PendingStore for JsonFileStore {
    fn load(&self, user: Address) -> Result<Vec<PendingAction>> {
        self.read(self.queue_path(user))
    }

    fn save(&self, user: Address, entries: &[PendingAction]) -> Result<()> {
        self.write(self.queue_path(user), entries)
    }

    fn load_history(&self, user: Address) -> Result<Vec<TxRecord>> {
        self.read(self.history_path(user))
    }

    fn save_history(&self, user: Address, records: &[TxRecord]) -> Result<()> {
        self.write(self.history_path(user), records)
    }
}

/// in-memory backend for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<Address, Vec<PendingAction>>>,
    histories: Mutex<HashMap<Address, Vec<TxRecord>>>,
}

impl PendingStore for MemoryStore {
    fn load(&self, user: Address) -> Result<Vec<PendingAction>> {
        let queues = self.queues.lock().map_err(poisoned)?;
        Ok(queues.get(&user).cloned().unwrap_or_default())
    }

    fn save(&self, user: Address, entries: &[PendingAction]) -> Result<()> {
        let mut queues = self.queues.lock().map_err(poisoned)?;
        queues.insert(user, entries.to_vec());
        Ok(())
    }

    fn load_history(&self, user: Address) -> Result<Vec<TxRecord>> {
        let histories = self.histories.lock().map_err(poisoned)?;
        Ok(histories.get(&user).cloned().unwrap_or_default())
    }

    fn save_history(&self, user: Address, records: &[TxRecord]) -> Result<()> {
        let mut histories = self.histories.lock().map_err(poisoned)?;
        histories.insert(user, records.to_vec());
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ClientError {
    ClientError::Storage("pending store lock poisoned".into())
}

/// reconciler state for one user
///
/// every mutation is a read-modify-write inside a single lock scope so
/// concurrent refresh callbacks cannot interleave partial updates.
pub struct PendingTracker {
    user: Address,
    store: Box<dyn PendingStore>,
    expiry_secs: i64,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    entries: Vec<PendingAction>,
    history: Vec<TxRecord>,
}

impl PendingTracker {
    /// load persisted state; a broken store logs and starts empty
    pub fn load(user: Address, store: Box<dyn PendingStore>, expiry_secs: u64) -> Self {
        let entries = store.load(user).unwrap_or_else(|e| {
            tracing::warn!("failed to load pending queue for {user}: {e}");
            Vec::new()
        });
        let history = store.load_history(user).unwrap_or_else(|e| {
            tracing::warn!("failed to load tx history for {user}: {e}");
            Vec::new()
        });
        Self {
            user,
            store,
            expiry_secs: expiry_secs as i64,
            state: Mutex::new(TrackerState { entries, history }),
        }
    }

    pub fn user(&self) -> Address {
        self.user
    }

    /// record a freshly submitted action
    pub fn record(&self, kind: ActionKind, currency: Address, tx_hash: TxHash) {
        self.record_at(kind, currency, tx_hash, Utc::now().timestamp());
    }

    fn record_at(&self, kind: ActionKind, currency: Address, tx_hash: TxHash, now: i64) {
        self.mutate(|state| {
            state.entries.push(PendingAction {
                kind,
                currency,
                tx_hash,
                submitted_at: now,
                inclusion_block: None,
            });
            state.history.push(TxRecord {
                tx_hash,
                kind,
                currency,
                status: TxRecordStatus::Pending,
                block_number: None,
                submitted_at: now,
            });
        });
    }

    /// attach the inclusion block once the receipt arrives
    pub fn set_inclusion_block(&self, tx_hash: TxHash, block: u64) {
        self.mutate(|state| {
            for entry in state.entries.iter_mut().filter(|e| e.tx_hash == tx_hash) {
                entry.inclusion_block = Some(block);
            }
            for record in state.history.iter_mut().filter(|r| r.tx_hash == tx_hash) {
                record.block_number = Some(block);
            }
        });
    }

    /// drop a transaction that is known to have failed on chain
    pub fn mark_failed(&self, tx_hash: TxHash) {
        self.mutate(|state| {
            state.entries.retain(|e| e.tx_hash != tx_hash);
            for record in state.history.iter_mut().filter(|r| r.tx_hash == tx_hash) {
                record.status = TxRecordStatus::Failed;
            }
        });
    }

    /// drop entries the indexer has caught up with, and anything past
    /// the forced expiry
    pub fn reconcile(&self, indexed_block: u64) {
        self.reconcile_at(indexed_block, Utc::now().timestamp());
    }

    fn reconcile_at(&self, indexed_block: u64, now: i64) {
        let expiry = self.expiry_secs;
        self.mutate(|state| {
            state.entries.retain(|entry| {
                if let Some(block) = entry.inclusion_block {
                    if indexed_block >= block {
                        return false;
                    }
                }
                if now - entry.submitted_at >= expiry {
                    tracing::warn!(
                        "pending {} for {} expired after {}s without indexing",
                        entry.kind.label(),
                        entry.currency,
                        expiry
                    );
                    return false;
                }
                true
            });
            for record in state.history.iter_mut() {
                if record.status == TxRecordStatus::Pending {
                    if let Some(block) = record.block_number {
                        if indexed_block >= block {
                            record.status = TxRecordStatus::Confirmed;
                        }
                    }
                }
            }
        });
    }

    /// whether this debt currency still has an unindexed action
    pub fn is_pending(&self, currency: Address) -> bool {
        self.state
            .lock()
            .map(|s| s.entries.iter().any(|e| e.currency == currency))
            .unwrap_or(false)
    }

    pub fn pending_currencies(&self) -> Vec<Address> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let mut currencies: Vec<Address> =
            state.entries.iter().map(|e| e.currency).collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }

    pub fn history(&self) -> Vec<TxRecord> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    fn mutate(&self, apply: impl FnOnce(&mut TrackerState)) {
        let Ok(mut state) = self.state.lock() else {
            tracing::warn!("pending tracker lock poisoned; dropping update");
            return;
        };
        apply(&mut state);
        if let Err(e) = self.store.save(self.user, &state.entries) {
            tracing::warn!("failed to persist pending queue: {e}");
        }
        if let Err(e) = self.store.save_history(self.user, &state.history) {
            tracing::warn!("failed to persist tx history: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PendingTracker {
        PendingTracker::load(Address([7; 20]), Box::new(MemoryStore::default()), 1800)
    }

    fn currency() -> Address {
        Address([1; 20])
    }

    fn hash(n: u8) -> TxHash {
        TxHash([n; 32])
    }

    #[test]
    fn entries_survive_until_the_indexer_catches_up() {
        let t = tracker();
        t.record_at(ActionKind::Borrow, currency(), hash(1), 1000);
        t.set_inclusion_block(hash(1), 500);

        t.reconcile_at(499, 1001);
        assert!(t.is_pending(currency()));

        t.reconcile_at(500, 1002);
        assert!(!t.is_pending(currency()));
    }

    #[test]
    fn entries_without_receipts_wait_for_the_forced_expiry() {
        let t = tracker();
        t.record_at(ActionKind::Repay, currency(), hash(2), 1000);

        // indexer advancing does nothing without an inclusion block
        t.reconcile_at(10_000, 1000 + 1799);
        assert!(t.is_pending(currency()));

        t.reconcile_at(10_000, 1000 + 1800);
        assert!(!t.is_pending(currency()));
    }

    #[test]
    fn failed_transactions_leave_the_queue_immediately() {
        let t = tracker();
        t.record_at(ActionKind::Borrow, currency(), hash(3), 1000);
        t.mark_failed(hash(3));
        assert!(!t.is_pending(currency()));
        assert_eq!(t.history()[0].status, TxRecordStatus::Failed);
    }

    #[test]
    fn history_confirms_once_indexed() {
        let t = tracker();
        t.record_at(ActionKind::Settle, currency(), hash(4), 1000);
        t.set_inclusion_block(hash(4), 42);
        t.reconcile_at(42, 1001);
        assert_eq!(t.history()[0].status, TxRecordStatus::Confirmed);
        assert_eq!(t.history()[0].block_number, Some(42));
    }

    #[test]
    fn queue_round_trips_through_the_store() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let user = Address([9; 20]);

        struct Shared(std::sync::Arc<MemoryStore>);
        impl PendingStore for Shared {
            fn load(&self, user: Address) -> crate::error::Result<Vec<PendingAction>> {
                self.0.load(user)
            }
            fn save(&self, user: Address, entries: &[PendingAction]) -> crate::error::Result<()> {
                self.0.save(user, entries)
            }
            fn load_history(&self, user: Address) -> crate::error::Result<Vec<TxRecord>> {
                self.0.load_history(user)
            }
            fn save_history(&self, user: Address, records: &[TxRecord]) -> crate::error::Result<()> {
                self.0.save_history(user, records)
            }
        }

        let t = PendingTracker::load(user, Box::new(Shared(store.clone())), 1800);
        t.record_at(ActionKind::Borrow, currency(), hash(5), 1000);
        drop(t);

        let reloaded = PendingTracker::load(user, Box::new(Shared(store)), 1800);
        assert!(reloaded.is_pending(currency()));
    }

    #[test]
    fn json_store_round_trips_on_disk() {
        let dir = std::env::temp_dir().join(format!("futura-pending-{}", std::process::id()));
        let store = JsonFileStore::new(&dir);
        let user = Address([3; 20]);
        let entries = vec![PendingAction {
            kind: ActionKind::Redeem,
            currency: currency(),
            tx_hash: hash(6),
            submitted_at: 1234,
            inclusion_block: Some(7),
        }];
        store.save(user, &entries).unwrap();
        assert_eq!(store.load(user).unwrap(), entries);
        let _ = std::fs::remove_dir_all(dir);
    }
}
