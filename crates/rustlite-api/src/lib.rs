//! # RustLite
//!
//! A lightweight, transactional embedded storage core with snapshot
//! isolation, shadow-paging writes, and crash recovery.
//!
//! [`StorageEngine`] is the orchestration facade: it owns one instance of
//! each component (Transaction Manager, Version Store, Snapshot Manager,
//! Garbage Collector) and sequences the cross-component calls so callers
//! never have to remember the ordering themselves.
//!
//! ## Quick Start
//!
//! ```rust
//! use rustlite::{EngineConfig, StorageEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let mut config = EngineConfig::default();
//! config.wal.wal_dir = dir.path().join("wal");
//! std::fs::create_dir_all(&config.wal.wal_dir)?;
//!
//! let engine = StorageEngine::open(config)?;
//!
//! let tx = engine.begin_transaction()?;
//! engine.write(&tx, "cn=alice", b"hello".to_vec())?;
//! engine.commit(tx)?;
//!
//! let tx = engine.begin_transaction()?;
//! let value = engine.read(&tx, "cn=alice")?;
//! assert_eq!(value, b"hello");
//! engine.commit(tx)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry_codec;
pub mod logging;
pub mod security;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

pub use rustlite_core::{Error, Result};
use rustlite_core::{
    InMemoryPageStore, LogicalClock, PageStore, SnapshotView, Transaction, TransactionManager,
    VersionStore, Wal, WalRecord,
};
pub use rustlite_snapshot::{Collector, GcConfig, GcStats, Snapshot, SnapshotManager};
pub use rustlite_storage::{CowManager, ShadowManager};
pub use rustlite_wal::{CoreWal, SyncMode, WalConfig};

/// Bundles the per-subsystem configuration the [`StorageEngine`] needs to
/// open: the WAL, the Version Store's LRU size, where to find/write the
/// cache file, and the Garbage Collector's tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Write-ahead log configuration.
    pub wal: WalConfig,
    /// Path the cache file is written to/read from by
    /// [`StorageEngine::checkpoint`]/[`StorageEngine::restore`]. `None`
    /// disables checkpointing.
    pub cache_path: Option<PathBuf>,
    /// Version Store LRU capacity; `<= 0` uses the store's default.
    pub cache_max_size: i64,
    /// Garbage Collector tuning.
    pub gc: GcConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wal: WalConfig::default(),
            cache_path: None,
            cache_max_size: -1,
            gc: GcConfig::default(),
        }
    }
}

/// A transaction handle bundled with the snapshot taken at `begin`, as
/// the facade's callers need both: the snapshot decides what's visible,
/// the transaction records what's read/written and drives commit/abort.
pub struct EngineTransaction {
    tx: Transaction,
    snapshot: Snapshot,
}

impl EngineTransaction {
    /// The underlying transaction id.
    pub fn id(&self) -> u64 {
        self.tx.id()
    }
}

/// The transactional storage core's orchestration facade.
///
/// Owns the Transaction Manager, Version Store, Snapshot Manager, and
/// Garbage Collector, and sequences the begin → read/write → commit/
/// rollback → checkpoint/restore calls across them.
pub struct StorageEngine {
    wal: Arc<CoreWal>,
    clock: Arc<LogicalClock>,
    tx_manager: Arc<TransactionManager>,
    versions: Arc<VersionStore>,
    snapshots: Arc<SnapshotManager>,
    gc: Arc<Collector>,
    cache_path: Option<PathBuf>,
}

impl StorageEngine {
    /// Open a storage engine backed by `config`. Does not replay any
    /// existing WAL or cache file; call [`Self::restore`] explicitly for
    /// that, since only the caller knows which checkpoint tx id to expect.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let wal = Arc::new(CoreWal::open(config.wal)?);
        let clock = Arc::new(LogicalClock::new());
        let wal_iface: Arc<dyn Wal> = wal.clone();
        let tx_manager = TransactionManager::new(wal_iface, Arc::clone(&clock));
        let page_store: Arc<dyn PageStore> = Arc::new(InMemoryPageStore::new());
        let versions = Arc::new(VersionStore::new(page_store, config.cache_max_size));
        let snapshots = Arc::new(SnapshotManager::new(Arc::clone(&clock)));
        let gc = Collector::new(config.gc, Arc::clone(&snapshots), Arc::clone(&versions));

        Ok(Self {
            wal,
            clock,
            tx_manager,
            versions,
            snapshots,
            gc,
            cache_path: config.cache_path,
        })
    }

    /// Start the background garbage collection loop.
    pub fn start_gc(&self) -> Result<()> {
        self.gc.start()
    }

    /// Stop the background garbage collection loop.
    pub fn stop_gc(&self) -> Result<()> {
        self.gc.stop()
    }

    /// Begin a new transaction and take its snapshot.
    #[instrument(skip(self))]
    pub fn begin_transaction(&self) -> Result<EngineTransaction> {
        let tx = self.tx_manager.begin()?;
        let snapshot = self.snapshots.create_snapshot(&tx, &self.tx_manager)?;
        Ok(EngineTransaction { tx, snapshot })
    }

    fn view(snapshot: &Snapshot) -> SnapshotView {
        snapshot.view()
    }

    /// Read the version of `dn` visible to `tx`'s snapshot.
    #[instrument(skip(self, tx))]
    pub fn read(&self, tx: &EngineTransaction, dn: &str) -> Result<Vec<u8>> {
        security::validate_dn(dn)?;
        let view = Self::view(&tx.snapshot);
        let snap = self.versions.get_visible(dn, &view)?;
        tx.tx.record_read(snap.page_id)?;
        snap.data
            .ok_or_else(|| Error::NotFound(format!("{dn} has no data")))
    }

    /// Write `data` to `dn` within `tx`. Durable once `tx` commits: the
    /// Version Store's in-memory version is paired with an explicit WAL
    /// `Update` record carrying the DN and payload, replayed by
    /// [`Self::restore`].
    ///
    /// Each DN write is a brand-new version-chain node over a freshly
    /// allocated page, so it has no prior contents to shadow; the
    /// [`CowManager`]/[`ShadowManager`] pair (re-exported for callers
    /// that need raw page-level before/after-image semantics) is not on
    /// this path.
    #[instrument(skip(self, tx, data))]
    pub fn write(&self, tx: &EngineTransaction, dn: &str, data: Vec<u8>) -> Result<()> {
        security::validate_dn(dn)?;
        security::validate_payload(&data)?;

        let page_id = self.versions.create_version(tx.tx.id(), dn, data.clone())?;
        tx.tx.record_write(page_id)?;
        self.wal
            .append(WalRecord::Update {
                tx_id: tx.tx.id(),
                page_id,
                offset: 0,
                before_image: None,
                after_image: Some(entry_codec::encode_write(dn, &data)),
            })
            .map_err(|e| Error::Durability(e.to_string()))?;
        debug!(dn, tx_id = tx.tx.id(), "write logged");
        Ok(())
    }

    /// Append a deletion tombstone for `dn` within `tx`.
    #[instrument(skip(self, tx))]
    pub fn delete(&self, tx: &EngineTransaction, dn: &str) -> Result<()> {
        security::validate_dn(dn)?;

        let page_id = self.versions.delete_version(tx.tx.id(), dn)?;
        tx.tx.record_write(page_id)?;
        self.wal
            .append(WalRecord::Update {
                tx_id: tx.tx.id(),
                page_id,
                offset: 0,
                before_image: None,
                after_image: Some(entry_codec::encode_delete(dn)),
            })
            .map_err(|e| Error::Durability(e.to_string()))?;
        Ok(())
    }

    /// Commit `tx`: validates conflicts and syncs the WAL (Transaction
    /// Manager), stamps the commit timestamp onto its versions (Version
    /// Store), and releases its snapshot (Snapshot Manager).
    #[instrument(skip(self, tx))]
    pub fn commit(&self, tx: EngineTransaction) -> Result<u64> {
        let commit_ts = tx.tx.commit()?;
        self.versions.commit_versions(tx.tx.id(), commit_ts)?;
        self.snapshots.release_snapshot(&tx.snapshot)?;
        Ok(commit_ts)
    }

    /// Roll back `tx`: unwinds its uncommitted versions and releases its
    /// snapshot.
    #[instrument(skip(self, tx))]
    pub fn rollback(&self, tx: EngineTransaction) -> Result<()> {
        tx.tx.rollback()?;
        self.versions.rollback_versions(tx.tx.id())?;
        self.snapshots.release_snapshot(&tx.snapshot)?;
        Ok(())
    }

    /// Snapshot every committed, non-deleted version to the configured
    /// cache path, tagged with the next transaction id that would be
    /// assigned. Returns that tag, which [`Self::restore`] must be given
    /// back to accept the file. A no-op if no cache path is configured.
    pub fn checkpoint(&self) -> Result<Option<u64>> {
        let Some(path) = &self.cache_path else {
            return Ok(None);
        };
        let tag = self.tx_manager.next_tx_id();
        self.versions.save_cache(path, tag)?;
        debug!(tag, "checkpoint written");
        Ok(Some(tag))
    }

    /// Restore state: loads the cache file at `checkpoint_tx_id` (if a
    /// cache path is configured and a file exists there), then replays
    /// every WAL `Update` record from a committed transaction, assigning
    /// each replayed transaction a fresh ascending commit timestamp (the
    /// WAL does not carry the original one). Advances the logical clock
    /// and the transaction id counter past everything observed so new
    /// activity cannot collide with replayed state.
    #[instrument(skip(self))]
    pub fn restore(&self, checkpoint_tx_id: u64) -> Result<()> {
        if let Some(path) = &self.cache_path {
            if path.exists() {
                self.versions.load_cache(path, checkpoint_tx_id)?;
            }
        }

        let records = self.wal.recover()?;
        let mut next_ts = self.clock.current().max(1);
        let mut max_tx_id = 0u64;
        let mut current_tx: Option<(u64, u64)> = None;

        for record in records {
            if let rustlite_core::WalRecord::Update {
                tx_id,
                after_image: Some(payload),
                ..
            } = record
            {
                max_tx_id = max_tx_id.max(tx_id);
                let commit_ts = match current_tx {
                    Some((id, ts)) if id == tx_id => ts,
                    _ => {
                        next_ts += 1;
                        current_tx = Some((tx_id, next_ts));
                        next_ts
                    }
                };
                let entry = entry_codec::decode(&payload)?;
                self.versions.restore_entry(&entry.dn, entry.data, commit_ts)?;
            }
        }

        self.snapshots.set_timestamp(next_ts)?;
        self.tx_manager.fast_forward_tx_id(max_tx_id + 1);
        debug!(next_ts, max_tx_id, "restore complete");
        Ok(())
    }

    /// Observability: Version Store chain/cache counters.
    pub fn version_stats(&self) -> Result<rustlite_core::VersionStoreStats> {
        self.versions.stats()
    }

    /// Observability: Garbage Collector cycle/collection counters.
    pub fn gc_stats(&self) -> Result<GcStats> {
        self.gc.stats()
    }
}
