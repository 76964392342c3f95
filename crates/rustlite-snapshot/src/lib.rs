//! # RustLite Snapshot
//!
//! The Snapshot Manager (component F): mints and tracks the
//! reference-counted, timestamp-identified snapshots that the Version
//! Store's visibility predicate checks versions against, plus the
//! background/on-demand Garbage Collector (component G) that trims
//! version chains once no live snapshot can still see their tail.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gc;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use rustlite_core::{LogicalClock, SnapshotView, Transaction, TransactionId, TransactionManager};

pub use gc::{Collector, GcConfig, GcStats};

/// A registered, reference-counted point-in-time view.
///
/// Cloning a `Snapshot` does not bump its ref count; use
/// [`SnapshotManager::release_snapshot`] to drop the one you were handed
/// when you're done with it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    timestamp: u64,
    active_tx_ids: Vec<TransactionId>,
    tx_id: TransactionId,
}

impl Snapshot {
    /// The logical instant this snapshot was taken at.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The transaction this snapshot belongs to.
    pub fn tx_id(&self) -> TransactionId {
        self.tx_id
    }

    /// Build the plain-data [`SnapshotView`] the Version Store's
    /// visibility predicate consumes.
    pub fn view(&self) -> SnapshotView {
        SnapshotView {
            timestamp: self.timestamp,
            active_tx_ids: self.active_tx_ids.clone(),
            tx_id: self.tx_id,
        }
    }
}

struct Entry {
    snapshot: Snapshot,
    ref_count: u64,
    released: bool,
}

/// Mints and tracks snapshots, and answers the "oldest still-live
/// snapshot" question the Garbage Collector needs.
///
/// Owns a single readers-writer lock over its registry, per the
/// locking discipline the rest of this workspace follows.
pub struct SnapshotManager {
    clock: Arc<LogicalClock>,
    registry: RwLock<BTreeMap<u64, Entry>>,
}

impl SnapshotManager {
    /// Build a manager drawing timestamps from `clock` — the same clock
    /// the Transaction Manager advances on commit, so snapshot and
    /// commit timestamps are directly comparable.
    pub fn new(clock: Arc<LogicalClock>) -> Self {
        Self {
            clock,
            registry: RwLock::new(BTreeMap::new()),
        }
    }

    /// Take a new snapshot for `tx`: capture the transactions active at
    /// this instant (excluding `tx` itself), and register it with
    /// `ref_count = 1`.
    ///
    /// Uses `tx.snapshot()` — the timestamp the Transaction Manager
    /// already minted off the same shared clock at `begin()` — as this
    /// snapshot's timestamp, rather than advancing the clock again here.
    /// Advancing a second time would give the transaction's reads a
    /// timestamp different from the one its own `Transaction` handle
    /// reports, letting a commit that lands between the two become
    /// visible or invisible inconsistently with what `tx.snapshot()`
    /// promised the caller.
    pub fn create_snapshot(
        &self,
        tx: &Transaction,
        tx_manager: &Arc<TransactionManager>,
    ) -> rustlite_core::Result<Snapshot> {
        let timestamp = tx.snapshot();
        let mut active_tx_ids = tx_manager.active_transaction_ids()?;
        active_tx_ids.retain(|&id| id != tx.id());
        active_tx_ids.sort_unstable();

        let snapshot = Snapshot {
            timestamp,
            active_tx_ids,
            tx_id: tx.id(),
        };
        self.registry.write()?.insert(
            timestamp,
            Entry {
                snapshot: snapshot.clone(),
                ref_count: 1,
                released: false,
            },
        );
        Ok(snapshot)
    }

    /// Release a reference to `snapshot`; once its count reaches zero it
    /// is marked released and dropped from the registry.
    pub fn release_snapshot(&self, snapshot: &Snapshot) -> rustlite_core::Result<()> {
        let mut registry = self.registry.write()?;
        let remove = if let Some(entry) = registry.get_mut(&snapshot.timestamp) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                entry.released = true;
            }
            entry.ref_count == 0
        } else {
            false
        };
        if remove {
            registry.remove(&snapshot.timestamp);
        }
        Ok(())
    }

    /// Allocate a fresh logical instant without registering a snapshot,
    /// for the Transaction Manager's commit path.
    pub fn advance_timestamp(&self) -> u64 {
        self.clock.advance()
    }

    /// Current clock value without advancing it.
    pub fn current_timestamp(&self) -> u64 {
        self.clock.current()
    }

    /// Force the clock to `ts`. Used by recovery to restore the clock
    /// from the highest timestamp observed in the WAL or cache file.
    pub fn set_timestamp(&self, ts: u64) -> rustlite_core::Result<()> {
        self.clock.set(ts);
        Ok(())
    }

    /// The minimum timestamp over non-released registered snapshots, or
    /// 0 if none are live.
    pub fn oldest_active_snapshot(&self) -> rustlite_core::Result<u64> {
        Ok(self
            .registry
            .read()?
            .values()
            .filter(|e| !e.released)
            .map(|e| e.snapshot.timestamp)
            .min()
            .unwrap_or(0))
    }

    /// Number of snapshots currently registered (live or pending
    /// release), for observability.
    pub fn active_count(&self) -> rustlite_core::Result<usize> {
        Ok(self.registry.read()?.len())
    }
}
