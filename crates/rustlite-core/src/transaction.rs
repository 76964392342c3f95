//! Transaction Manager (component B).
//!
//! Assigns monotonic transaction ids, tracks the active set, and
//! orchestrates begin/commit/rollback against the write-ahead log. Write
//! sets are page ids, not arbitrary keys: conflict detection and WAL
//! before/after images operate at the page level, with the version store
//! (`version.rs`) layered on top for key-level semantics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tracing::{debug, instrument};

use crate::clock::LogicalClock;
use crate::error::{Error, Result};
use crate::page::PageId;
use crate::wal_iface::{Wal, WalRecord};

/// Transaction id, monotonically increasing, unique within the process.
pub type TransactionId = u64;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is in flight; reads/writes are permitted.
    Active,
    /// Transaction committed successfully; terminal.
    Committed,
    /// Transaction was rolled back; terminal.
    Aborted,
}

#[derive(Debug, Clone)]
struct ActiveEntry {
    state: TransactionState,
    snapshot: u64,
    start_lsn: u64,
    start_time: SystemTime,
    read_set: Vec<PageId>,
    write_set: Vec<PageId>,
}

impl ActiveEntry {
    fn record(set: &mut Vec<PageId>, page_id: PageId) {
        if !set.contains(&page_id) {
            set.push(page_id);
        }
    }
}

/// A handle to an in-flight (or just-terminated) transaction.
///
/// Cheap to clone; all mutable state lives in the owning
/// [`TransactionManager`] and is reached through `manager`.
#[derive(Clone)]
pub struct Transaction {
    id: TransactionId,
    snapshot: u64,
    start_lsn: u64,
    start_time: SystemTime,
    manager: Arc<TransactionManager>,
}

impl Transaction {
    /// This transaction's id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The logical timestamp this transaction's reads are pinned to.
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    /// WAL position at the time this transaction began.
    pub fn start_lsn(&self) -> u64 {
        self.start_lsn
    }

    /// Wall-clock time this transaction began, for diagnostics only.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Result<TransactionState> {
        self.manager.state_of(self.id)
    }

    /// Defensive copy of the pages read so far.
    pub fn read_set(&self) -> Result<Vec<PageId>> {
        self.manager.read_set_of(self.id)
    }

    /// Defensive copy of the pages written so far.
    pub fn write_set(&self) -> Result<Vec<PageId>> {
        self.manager.write_set_of(self.id)
    }

    /// Record that this transaction read `page_id`.
    pub fn record_read(&self, page_id: PageId) -> Result<()> {
        self.manager.record_read(self.id, page_id)
    }

    /// Record that this transaction wrote `page_id`.
    pub fn record_write(&self, page_id: PageId) -> Result<()> {
        self.manager.record_write(self.id, page_id)
    }

    /// Commit this transaction through its owning manager.
    pub fn commit(&self) -> Result<u64> {
        self.manager.commit(self.id)
    }

    /// Roll back this transaction through its owning manager.
    pub fn rollback(&self) -> Result<()> {
        self.manager.rollback(self.id)
    }
}

/// Assigns ids, tracks active transactions, and sequences begin/commit/
/// rollback against the WAL.
pub struct TransactionManager {
    next_tx_id: AtomicU64,
    clock: Arc<LogicalClock>,
    wal: Arc<dyn Wal>,
    commit_lock: Mutex<()>,
    active: RwLock<BTreeMap<TransactionId, ActiveEntry>>,
}

impl TransactionManager {
    /// Construct a manager backed by `wal`, drawing snapshot timestamps
    /// from the shared `clock`.
    pub fn new(wal: Arc<dyn Wal>, clock: Arc<LogicalClock>) -> Arc<Self> {
        Arc::new(Self {
            next_tx_id: AtomicU64::new(1),
            clock,
            wal,
            commit_lock: Mutex::new(()),
            active: RwLock::new(BTreeMap::new()),
        })
    }

    /// The id that will be assigned to the *next* `begin()`.
    pub fn next_tx_id(&self) -> TransactionId {
        self.next_tx_id.load(Ordering::SeqCst)
    }

    /// Raise the next-assigned id to at least `min_next`, without ever
    /// lowering it. Used by recovery to avoid reissuing a transaction id
    /// already seen in the WAL or a loaded cache file.
    pub fn fast_forward_tx_id(&self, min_next: TransactionId) {
        self.next_tx_id.fetch_max(min_next, Ordering::SeqCst);
    }

    /// Begin a new transaction: assigns an id, mints a snapshot timestamp
    /// from the shared logical clock, appends `Begin` to the WAL, and
    /// registers the transaction as active.
    #[instrument(skip(self: &Arc<Self>))]
    pub fn begin(self: &Arc<Self>) -> Result<Transaction> {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let start_lsn = self.wal.current_lsn()?;
        self.wal.append(WalRecord::Begin { tx_id })?;
        let snapshot = self.clock.advance();
        let start_time = SystemTime::now();

        let entry = ActiveEntry {
            state: TransactionState::Active,
            snapshot,
            start_lsn,
            start_time,
            read_set: Vec::new(),
            write_set: Vec::new(),
        };
        self.active.write()?.insert(tx_id, entry);
        debug!(tx_id, snapshot, "transaction begun");

        Ok(Transaction {
            id: tx_id,
            snapshot,
            start_lsn,
            start_time,
            manager: Arc::clone(self),
        })
    }

    fn state_of(&self, tx_id: TransactionId) -> Result<TransactionState> {
        let active = self.active.read()?;
        active
            .get(&tx_id)
            .map(|e| e.state)
            .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))
    }

    fn read_set_of(&self, tx_id: TransactionId) -> Result<Vec<PageId>> {
        let active = self.active.read()?;
        active
            .get(&tx_id)
            .map(|e| e.read_set.clone())
            .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))
    }

    fn write_set_of(&self, tx_id: TransactionId) -> Result<Vec<PageId>> {
        let active = self.active.read()?;
        active
            .get(&tx_id)
            .map(|e| e.write_set.clone())
            .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))
    }

    fn record_read(&self, tx_id: TransactionId, page_id: PageId) -> Result<()> {
        let mut active = self.active.write()?;
        let entry = active
            .get_mut(&tx_id)
            .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))?;
        ActiveEntry::record(&mut entry.read_set, page_id);
        Ok(())
    }

    fn record_write(&self, tx_id: TransactionId, page_id: PageId) -> Result<()> {
        let mut active = self.active.write()?;
        let entry = active
            .get_mut(&tx_id)
            .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))?;
        ActiveEntry::record(&mut entry.write_set, page_id);
        Ok(())
    }

    /// Commit a transaction: validates no overlapping write set with any
    /// other active transaction (pessimistic, first-wins), appends
    /// `Commit`, syncs the WAL, and removes the transaction from the
    /// active set. Returns the commit timestamp on success.
    #[instrument(skip(self))]
    pub fn commit(&self, tx_id: TransactionId) -> Result<u64> {
        let _serialize = self.commit_lock.lock()?;

        let write_set = {
            let active = self.active.read()?;
            let entry = active
                .get(&tx_id)
                .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))?;
            if entry.state != TransactionState::Active {
                return Err(Error::State(format!("transaction {tx_id} is not active")));
            }
            entry.write_set.clone()
        };

        {
            let active = self.active.read()?;
            for (other_id, other) in active.iter() {
                if *other_id == tx_id || other.state != TransactionState::Active {
                    continue;
                }
                if other.write_set.iter().any(|p| write_set.contains(p)) {
                    return Err(Error::Conflict(format!(
                        "transaction {tx_id} conflicts with active transaction {other_id}"
                    )));
                }
            }
        }

        let commit_ts = self.clock.advance();
        self.wal
            .append(WalRecord::Commit { tx_id })
            .map_err(|e| Error::Durability(e.to_string()))?;
        self.wal
            .sync()
            .map_err(|e| Error::Durability(e.to_string()))?;

        let mut active = self.active.write()?;
        active.remove(&tx_id);
        debug!(tx_id, commit_ts, "transaction committed");
        Ok(commit_ts)
    }

    /// Roll back a transaction: appends `Abort`, syncs the WAL, clears
    /// the write set, and removes the transaction from the active set.
    #[instrument(skip(self))]
    pub fn rollback(&self, tx_id: TransactionId) -> Result<()> {
        {
            let active = self.active.read()?;
            let entry = active
                .get(&tx_id)
                .ok_or_else(|| Error::State(format!("transaction {tx_id} not found")))?;
            if entry.state != TransactionState::Active {
                return Err(Error::State(format!("transaction {tx_id} is not active")));
            }
        }

        self.wal
            .append(WalRecord::Abort { tx_id })
            .map_err(|e| Error::Durability(e.to_string()))?;
        self.wal
            .sync()
            .map_err(|e| Error::Durability(e.to_string()))?;

        let mut active = self.active.write()?;
        active.remove(&tx_id);
        debug!(tx_id, "transaction rolled back");
        Ok(())
    }

    /// Defensive copies of every currently-active transaction's id and
    /// snapshot timestamp, used by the Snapshot Manager to build the
    /// `active_tx_ids` set of a new snapshot.
    pub fn active_transaction_ids(&self) -> Result<Vec<TransactionId>> {
        Ok(self.active.read()?.keys().copied().collect())
    }
}
