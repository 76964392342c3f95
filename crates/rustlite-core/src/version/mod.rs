//! Multi-Version Store (component E).
//!
//! Per-DN version chains with snapshot-aware lookup, an in-memory LRU
//! cache (E.1) for head entries, and a persistence codec (E.2) for
//! restart snapshots.

pub mod lru;
pub mod persist;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::page::{PageId, PageStore};
use crate::snapshot_view::{is_visible, SnapshotView};
use crate::transaction::TransactionId;
use lru::LruCache;

/// Whether a version represents live data or a deletion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// Holds live data.
    Active,
    /// Tombstone: the DN was deleted at this point in the chain.
    Deleted,
}

/// One node in a DN's version chain.
#[derive(Debug)]
pub struct Version {
    tx_id: TransactionId,
    commit_ts: AtomicU64,
    data: Option<Vec<u8>>,
    state: VersionState,
    page_id: PageId,
    slot_id: u16,
    prev: Option<Arc<Version>>,
}

impl Version {
    /// 0 if still uncommitted.
    pub fn commit_ts(&self) -> u64 {
        self.commit_ts.load(Ordering::SeqCst)
    }

    fn stamp(&self, ts: u64) {
        self.commit_ts.store(ts, Ordering::SeqCst);
    }
}

/// A defensive, owned copy of a version returned from a lookup.
#[derive(Debug, Clone)]
pub struct VersionSnapshot {
    /// Transaction that created this version.
    pub tx_id: TransactionId,
    /// 0 if uncommitted.
    pub commit_ts: u64,
    /// Payload bytes, absent for tombstones.
    pub data: Option<Vec<u8>>,
    /// Active or Deleted.
    pub state: VersionState,
    /// Backing page.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot_id: u16,
}

impl From<&Version> for VersionSnapshot {
    fn from(v: &Version) -> Self {
        Self {
            tx_id: v.tx_id,
            commit_ts: v.commit_ts(),
            data: v.data.clone(),
            state: v.state,
            page_id: v.page_id,
            slot_id: v.slot_id,
        }
    }
}

/// Observability counters for the version store.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionStoreStats {
    /// Number of DNs with at least one version.
    pub chain_count: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
}

/// A loader consulted on a cold cache miss, typically backed by the page
/// store or an external cold-storage tier. Returns `None` for "no such
/// DN", distinct from an I/O error.
pub type DiskLoader = dyn Fn(&str) -> Result<Option<Vec<u8>>> + Send + Sync;

/// Per-DN version chains, write tracking, cache, and GC.
pub struct VersionStore {
    chains: RwLock<HashMap<String, Arc<Version>>>,
    active_writers: RwLock<HashMap<String, TransactionId>>,
    cache: LruCache<VersionSnapshot>,
    page_store: Arc<dyn PageStore>,
    loader: Option<Box<DiskLoader>>,
}

impl VersionStore {
    /// Construct a store over `page_store` with the given LRU capacity
    /// (`<= 0` uses the default).
    pub fn new(page_store: Arc<dyn PageStore>, cache_max_size: i64) -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            active_writers: RwLock::new(HashMap::new()),
            cache: LruCache::new(cache_max_size),
            page_store,
            loader: None,
        }
    }

    /// Attach a disk loader consulted on a cold miss (no in-memory chain
    /// and no cache entry for the DN).
    pub fn with_loader(mut self, loader: Box<DiskLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Look up the version of `dn` visible to `view`, consulting the
    /// in-memory chain, then the LRU cache, then the disk loader.
    #[instrument(skip(self, view))]
    pub fn get_visible(&self, dn: &str, view: &SnapshotView) -> Result<VersionSnapshot> {
        let head = self.chains.read()?.get(dn).cloned();
        if let Some(head) = head {
            let mut cur = Some(head);
            while let Some(v) = cur {
                if is_visible(v.commit_ts(), v.tx_id, view) {
                    if v.state == VersionState::Deleted {
                        return Err(Error::NotFound(format!("{dn} is deleted")));
                    }
                    let snap = VersionSnapshot::from(v.as_ref());
                    self.cache.put(dn.to_string(), snap.clone());
                    return Ok(snap);
                }
                cur = v.prev.clone();
            }
            return Err(Error::NotFound(format!("no visible version of {dn}")));
        }

        if let Some(snap) = self.cache.get(dn) {
            if is_visible(snap.commit_ts, snap.tx_id, view) {
                return Ok(snap);
            }
            return Err(Error::NotFound(format!("no visible version of {dn}")));
        }

        if let Some(loader) = &self.loader {
            if let Some(data) = loader(dn)? {
                let snap = VersionSnapshot {
                    tx_id: 0,
                    commit_ts: 1,
                    data: Some(data),
                    state: VersionState::Active,
                    page_id: 0,
                    slot_id: 0,
                };
                self.cache.put(dn.to_string(), snap.clone());
                if is_visible(snap.commit_ts, snap.tx_id, view) {
                    return Ok(snap);
                }
            }
        }

        Err(Error::NotFound(format!("{dn} not found")))
    }

    /// Create a new version of `dn` owned by `tx_id`, conflicting with
    /// any other transaction already writing the same DN.
    #[instrument(skip(self, data))]
    pub fn create_version(&self, tx_id: TransactionId, dn: &str, data: Vec<u8>) -> Result<PageId> {
        self.claim_writer(tx_id, dn)?;

        let page_id = self.page_store.allocate(crate::page::PageType::Data)?;
        let mut chains = self.chains.write()?;
        let prev = chains.get(dn).cloned();
        let version = Arc::new(Version {
            tx_id,
            commit_ts: AtomicU64::new(0),
            data: Some(data),
            state: VersionState::Active,
            page_id,
            slot_id: 0,
            prev,
        });
        chains.insert(dn.to_string(), Arc::clone(&version));
        drop(chains);
        self.cache.put(dn.to_string(), VersionSnapshot::from(version.as_ref()));
        debug!(dn, tx_id, "version created");
        Ok(page_id)
    }

    /// Append a deletion tombstone for `dn` owned by `tx_id`. Returns the
    /// page allocated for the tombstone, for callers that log a WAL
    /// record keyed by page id alongside it.
    pub fn delete_version(&self, tx_id: TransactionId, dn: &str) -> Result<PageId> {
        self.claim_writer(tx_id, dn)?;

        let mut chains = self.chains.write()?;
        let prev = chains
            .get(dn)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{dn} not found")))?;
        let page_id = self.page_store.allocate(crate::page::PageType::Data)?;
        let version = Arc::new(Version {
            tx_id,
            commit_ts: AtomicU64::new(0),
            data: None,
            state: VersionState::Deleted,
            page_id,
            slot_id: 0,
            prev: Some(prev),
        });
        chains.insert(dn.to_string(), version);
        drop(chains);
        self.cache.delete(dn);
        Ok(page_id)
    }

    fn claim_writer(&self, tx_id: TransactionId, dn: &str) -> Result<()> {
        let mut writers = self.active_writers.write()?;
        match writers.get(dn) {
            Some(owner) if *owner != tx_id => Err(Error::Conflict(format!(
                "{dn} already has an uncommitted writer (tx {owner})"
            ))),
            _ => {
                writers.insert(dn.to_string(), tx_id);
                Ok(())
            }
        }
    }

    /// Stamp `commit_ts` onto every version owned by `tx_id` and release
    /// its writer claims.
    pub fn commit_versions(&self, tx_id: TransactionId, commit_ts: u64) -> Result<()> {
        let chains = self.chains.read()?;
        for head in chains.values() {
            let mut cur = Some(Arc::clone(head));
            while let Some(v) = cur {
                if v.tx_id == tx_id && v.commit_ts() == 0 {
                    v.stamp(commit_ts);
                }
                cur = v.prev.clone();
            }
        }
        drop(chains);
        self.active_writers.write()?.retain(|_, owner| *owner != tx_id);
        Ok(())
    }

    /// Unwind every chain's uncommitted head(s) belonging to `tx_id`.
    pub fn rollback_versions(&self, tx_id: TransactionId) -> Result<()> {
        let mut chains = self.chains.write()?;
        let mut to_remove = Vec::new();
        for (dn, head) in chains.iter_mut() {
            let mut cur = Arc::clone(head);
            while cur.tx_id == tx_id && cur.commit_ts() == 0 {
                match cur.prev.clone() {
                    Some(prev) => cur = prev,
                    None => {
                        to_remove.push(dn.clone());
                        break;
                    }
                }
            }
            *head = cur;
        }
        for dn in &to_remove {
            chains.remove(dn);
        }
        drop(chains);
        for dn in &to_remove {
            self.cache.delete(dn);
        }
        self.active_writers.write()?.retain(|_, owner| *owner != tx_id);
        Ok(())
    }

    /// Trim every chain down to its floor: the newest committed version
    /// with `commit_ts <= oldest_live_snapshot_ts`. Returns the number of
    /// versions collected.
    #[instrument(skip(self))]
    pub fn garbage_collect(&self, oldest_live_snapshot_ts: u64) -> Result<usize> {
        let mut chains = self.chains.write()?;
        let mut collected = 0usize;
        let mut drop_chain = Vec::new();

        for (dn, head) in chains.iter() {
            let mut nodes = Vec::new();
            let mut cur = Some(Arc::clone(head));
            while let Some(v) = cur {
                cur = v.prev.clone();
                nodes.push(v);
            }

            let floor_index = nodes.iter().position(|v| {
                v.commit_ts() != 0 && v.commit_ts() <= oldest_live_snapshot_ts
            });

            if let Some(idx) = floor_index {
                collected += nodes.len().saturating_sub(idx + 1);
                if nodes[idx].state == VersionState::Deleted
                    && nodes[idx].commit_ts() < oldest_live_snapshot_ts
                {
                    drop_chain.push(dn.clone());
                }
            }
        }

        for dn in &drop_chain {
            chains.remove(dn);
        }
        // Relink surviving heads to drop everything past the floor.
        for head in chains.values_mut() {
            *head = Self::truncate_at_floor(head, oldest_live_snapshot_ts);
        }

        debug!(collected, "garbage collection pass complete");
        Ok(collected)
    }

    /// Like [`Self::garbage_collect`], but restricted to a single DN's
    /// chain. Returns the number of versions collected, or 0 if `dn` has
    /// no chain.
    pub fn garbage_collect_entry(&self, dn: &str, oldest_live_snapshot_ts: u64) -> Result<usize> {
        let mut chains = self.chains.write()?;
        let Some(head) = chains.get(dn).cloned() else {
            return Ok(0);
        };

        let mut nodes = Vec::new();
        let mut cur = Some(Arc::clone(&head));
        while let Some(v) = cur {
            cur = v.prev.clone();
            nodes.push(v);
        }

        let floor_index = nodes
            .iter()
            .position(|v| v.commit_ts() != 0 && v.commit_ts() <= oldest_live_snapshot_ts);

        let Some(idx) = floor_index else {
            return Ok(0);
        };
        let collected = nodes.len().saturating_sub(idx + 1);

        if nodes[idx].state == VersionState::Deleted
            && nodes[idx].commit_ts() < oldest_live_snapshot_ts
        {
            chains.remove(dn);
            drop(chains);
            self.cache.delete(dn);
            return Ok(collected + 1);
        }

        chains.insert(dn.to_string(), Self::truncate_at_floor(&head, oldest_live_snapshot_ts));
        Ok(collected)
    }

    fn truncate_at_floor(head: &Arc<Version>, oldest_live_snapshot_ts: u64) -> Arc<Version> {
        fn rebuild(v: &Arc<Version>, floor_passed: &mut bool, oldest: u64) -> Option<Arc<Version>> {
            if *floor_passed {
                return None;
            }
            let keep_prev = if v.commit_ts() != 0 && v.commit_ts() <= oldest {
                *floor_passed = true;
                None
            } else {
                v.prev.as_ref().and_then(|p| rebuild(p, floor_passed, oldest))
            };
            Some(Arc::new(Version {
                tx_id: v.tx_id,
                commit_ts: AtomicU64::new(v.commit_ts()),
                data: v.data.clone(),
                state: v.state,
                page_id: v.page_id,
                slot_id: v.slot_id,
                prev: keep_prev,
            }))
        }
        let mut floor_passed = false;
        rebuild(head, &mut floor_passed, oldest_live_snapshot_ts).unwrap_or_else(|| Arc::clone(head))
    }

    /// Insert an already-committed version of `dn` during WAL-tail replay,
    /// bypassing writer-claim and conflict checks since recovery runs
    /// single-threaded before the store is opened to callers. `data` of
    /// `None` records a tombstone, mirroring [`Self::delete_version`].
    pub fn restore_entry(&self, dn: &str, data: Option<Vec<u8>>, commit_ts: u64) -> Result<()> {
        let page_id = self.page_store.allocate(crate::page::PageType::Data)?;
        let mut chains = self.chains.write()?;
        let prev = chains.get(dn).cloned();
        let state = if data.is_some() {
            VersionState::Active
        } else {
            VersionState::Deleted
        };
        let version = Arc::new(Version {
            tx_id: 0,
            commit_ts: AtomicU64::new(commit_ts),
            data,
            state,
            page_id,
            slot_id: 0,
            prev,
        });
        chains.insert(dn.to_string(), Arc::clone(&version));
        drop(chains);
        if state == VersionState::Active {
            self.cache.put(dn.to_string(), VersionSnapshot::from(version.as_ref()));
        } else {
            self.cache.delete(dn);
        }
        Ok(())
    }

    /// Number of DNs with at least one version.
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.chains.read()?.len())
    }

    /// Whether any version (committed or not) exists for `dn`.
    pub fn has_entry(&self, dn: &str) -> Result<bool> {
        Ok(self.chains.read()?.contains_key(dn))
    }

    /// Every DN with at least one version, in sorted order. Used by the
    /// Garbage Collector to walk chains in deterministic batches.
    pub fn dns(&self) -> Result<Vec<String>> {
        let mut dns: Vec<String> = self.chains.read()?.keys().cloned().collect();
        dns.sort_unstable();
        Ok(dns)
    }

    /// Snapshot of chain count plus cache hit/miss counters.
    pub fn stats(&self) -> Result<VersionStoreStats> {
        let chain_count = self.chains.read()?.len() as u64;
        let cache_stats = self.cache.stats();
        Ok(VersionStoreStats {
            chain_count,
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
        })
    }

    /// Persist every committed, non-deleted chain head to `path`.
    pub fn save_cache(&self, path: impl AsRef<std::path::Path>, tx_id: u64) -> Result<()> {
        let chains = self.chains.read()?;
        let mut entries = Vec::new();
        for (dn, head) in chains.iter() {
            if head.commit_ts() != 0 && head.state == VersionState::Active {
                if let Some(data) = &head.data {
                    entries.push(persist::SaveEntry {
                        dn,
                        data,
                        page_id: head.page_id,
                        slot_id: head.slot_id,
                    });
                }
            }
        }
        persist::save_cache(path, tx_id, &entries)
    }

    /// Load entries from `path`, restoring each as a committed version
    /// with the sentinel pre-existing timestamp (1).
    pub fn load_cache(&self, path: impl AsRef<std::path::Path>, expected_tx_id: u64) -> Result<usize> {
        let entries = persist::load_cache(path, expected_tx_id)?;
        let mut chains = self.chains.write()?;
        let count = entries.len();
        for entry in entries {
            let version = Arc::new(Version {
                tx_id: 0,
                commit_ts: AtomicU64::new(1),
                data: Some(entry.data),
                state: VersionState::Active,
                page_id: entry.page_id,
                slot_id: entry.slot_id,
                prev: None,
            });
            chains.insert(entry.dn, version);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::InMemoryPageStore;

    fn store() -> VersionStore {
        VersionStore::new(Arc::new(InMemoryPageStore::new()), 100)
    }

    fn view(timestamp: u64, active: Vec<u64>, tx_id: u64) -> SnapshotView {
        SnapshotView {
            timestamp,
            active_tx_ids: active,
            tx_id,
        }
    }

    #[test]
    fn create_then_read_own_uncommitted_write() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        let v = s.get_visible("cn=a", &view(0, vec![], 1)).unwrap();
        assert_eq!(v.data, Some(b"v1".to_vec()));
    }

    #[test]
    fn other_tx_cannot_see_uncommitted_write() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        let err = s.get_visible("cn=a", &view(0, vec![], 2)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn write_write_conflict_detected() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        let err = s.create_version(2, "cn=a", b"v2".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn commit_then_visible_to_later_snapshot() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        s.commit_versions(1, 100).unwrap();
        let v = s.get_visible("cn=a", &view(200, vec![], 99)).unwrap();
        assert_eq!(v.data, Some(b"v1".to_vec()));
    }

    #[test]
    fn rollback_removes_uncommitted_chain() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        s.rollback_versions(1).unwrap();
        assert!(!s.has_entry("cn=a").unwrap());
        // writer claim released, so another tx may now write it.
        s.create_version(2, "cn=a", b"v2".to_vec()).unwrap();
    }

    #[test]
    fn delete_then_not_found_for_later_readers() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        s.commit_versions(1, 100).unwrap();
        s.delete_version(2, "cn=a").unwrap();
        s.commit_versions(2, 200).unwrap();
        let err = s.get_visible("cn=a", &view(300, vec![], 99)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn save_and_load_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.bin");
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        s.commit_versions(1, 100).unwrap();
        s.save_cache(&path, 1).unwrap();

        let s2 = store();
        s2.load_cache(&path, 1).unwrap();
        let v = s2.get_visible("cn=a", &view(5, vec![], 99)).unwrap();
        assert_eq!(v.data, Some(b"v1".to_vec()));
    }

    #[test]
    fn garbage_collect_entry_trims_single_chain() {
        let s = store();
        s.create_version(1, "cn=a", b"v1".to_vec()).unwrap();
        s.commit_versions(1, 100).unwrap();
        s.create_version(2, "cn=a", b"v2".to_vec()).unwrap();
        s.commit_versions(2, 200).unwrap();

        let collected = s.garbage_collect_entry("cn=a", 200).unwrap();
        assert_eq!(collected, 1);
        let v = s.get_visible("cn=a", &view(300, vec![], 99)).unwrap();
        assert_eq!(v.data, Some(b"v2".to_vec()));
    }

    #[test]
    fn garbage_collect_entry_on_unknown_dn_is_noop() {
        let s = store();
        assert_eq!(s.garbage_collect_entry("cn=missing", 100).unwrap(), 0);
    }

    #[test]
    fn restore_entry_is_immediately_visible() {
        let s = store();
        s.restore_entry("cn=a", Some(b"v1".to_vec()), 50).unwrap();
        let v = s.get_visible("cn=a", &view(100, vec![], 99)).unwrap();
        assert_eq!(v.data, Some(b"v1".to_vec()));
    }

    #[test]
    fn restore_entry_tombstone_then_restore_active_builds_chain() {
        let s = store();
        s.restore_entry("cn=a", Some(b"v1".to_vec()), 50).unwrap();
        s.restore_entry("cn=a", None, 100).unwrap();
        let err = s.get_visible("cn=a", &view(200, vec![], 99)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
