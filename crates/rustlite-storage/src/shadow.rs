//! Shadow Page Manager (component C).
//!
//! Tracks, per transaction, which pages have been copy-on-write shadowed:
//! a bidirectional `original <-> shadow` mapping plus a per-transaction
//! list of owned shadows, so the CoW manager can materialize or discard
//! them atomically at commit/rollback time.

use std::collections::HashMap;
use std::sync::RwLock;

use rustlite_core::{Error, Page, PageId, PageStore, PageType, Result, TransactionId};

#[derive(Default)]
struct Maps {
    shadow_of: HashMap<PageId, PageId>,
    original_of: HashMap<PageId, PageId>,
    shadows_of: HashMap<TransactionId, Vec<PageId>>,
}

/// Maintains the original/shadow page mappings for in-flight transactions.
pub struct ShadowManager<S: PageStore> {
    store: S,
    maps: RwLock<Maps>,
    closed: RwLock<bool>,
}

impl<S: PageStore> ShadowManager<S> {
    /// Wrap a page store with shadow-page bookkeeping.
    pub fn new(store: S) -> Self {
        Self {
            store,
            maps: RwLock::new(Maps::default()),
            closed: RwLock::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(Error::State("shadow manager closed".to_string()));
        }
        Ok(())
    }

    /// Create (or return the already-owned) shadow of `original` for `tx`.
    ///
    /// Fails with [`Error::Conflict`] if another transaction already holds
    /// a shadow of this page.
    pub fn create_shadow(&self, tx: TransactionId, original: PageId) -> Result<PageId> {
        self.check_open()?;

        {
            let maps = self.maps.read()?;
            if let Some(&existing_shadow) = maps.shadow_of.get(&original) {
                let owned_by_tx = maps
                    .shadows_of
                    .get(&tx)
                    .map(|v| v.contains(&existing_shadow))
                    .unwrap_or(false);
                if owned_by_tx {
                    return Ok(existing_shadow);
                }
                return Err(Error::Conflict(format!(
                    "page {original} already shadowed by another transaction"
                )));
            }
        }

        let original_page = self.store.read(original)?;
        let shadow_id = self.store.allocate(PageType::Shadow)?;
        let mut shadow_page = Page::new(shadow_id, PageType::Shadow, original_page.data.clone());
        shadow_page.header.flags = original_page.header.flags;
        shadow_page.header.item_count = original_page.header.item_count;
        shadow_page.header.free_space = original_page.header.free_space;
        self.store.write(shadow_page)?;

        let mut maps = self.maps.write()?;
        maps.shadow_of.insert(original, shadow_id);
        maps.original_of.insert(shadow_id, original);
        maps.shadows_of.entry(tx).or_default().push(shadow_id);

        Ok(shadow_id)
    }

    /// The shadow of `original`, if one currently exists.
    pub fn get_shadow(&self, original: PageId) -> Result<Option<PageId>> {
        self.check_open()?;
        Ok(self.maps.read()?.shadow_of.get(&original).copied())
    }

    /// The original page a shadow stands in for, if `shadow` is known.
    pub fn get_original(&self, shadow: PageId) -> Result<Option<PageId>> {
        self.check_open()?;
        Ok(self.maps.read()?.original_of.get(&shadow).copied())
    }

    /// Free `original`'s shadow (if any) and the underlying shadow page.
    pub fn free_shadow(&self, original: PageId) -> Result<()> {
        self.check_open()?;
        let shadow_id = {
            let mut maps = self.maps.write()?;
            maps.shadow_of.remove(&original)
        };
        if let Some(shadow_id) = shadow_id {
            self.maps.write()?.original_of.remove(&shadow_id);
            self.store.free(shadow_id)?;
        }
        Ok(())
    }

    /// Discard every shadow `tx` holds, freeing the underlying pages.
    /// Used on the rollback path.
    pub fn free_transaction_shadows(&self, tx: TransactionId) -> Result<()> {
        self.check_open()?;
        let shadows = {
            let mut maps = self.maps.write()?;
            maps.shadows_of.remove(&tx).unwrap_or_default()
        };
        for shadow_id in shadows {
            let original = {
                let mut maps = self.maps.write()?;
                maps.original_of.remove(&shadow_id)
            };
            if let Some(original) = original {
                self.maps.write()?.shadow_of.remove(&original);
            }
            self.store.free(shadow_id)?;
        }
        Ok(())
    }

    /// Drop `tx`'s mapping entries without freeing the shadow pages — used
    /// on the commit path once shadows have been materialized elsewhere.
    pub fn clear_transaction_mappings(&self, tx: TransactionId) -> Result<()> {
        self.check_open()?;
        let shadows = {
            let mut maps = self.maps.write()?;
            maps.shadows_of.remove(&tx).unwrap_or_default()
        };
        let mut maps = self.maps.write()?;
        for shadow_id in shadows {
            if let Some(original) = maps.original_of.remove(&shadow_id) {
                maps.shadow_of.remove(&original);
            }
        }
        Ok(())
    }

    /// The shadows `tx` currently owns, in creation order.
    pub fn shadows_of(&self, tx: TransactionId) -> Result<Vec<PageId>> {
        self.check_open()?;
        Ok(self.maps.read()?.shadows_of.get(&tx).cloned().unwrap_or_default())
    }

    /// Whether `tx` owns the current shadow of `original`, if any.
    pub fn owns_shadow_of(&self, tx: TransactionId, original: PageId) -> Result<Option<PageId>> {
        self.check_open()?;
        let maps = self.maps.read()?;
        let Some(&shadow_id) = maps.shadow_of.get(&original) else {
            return Ok(None);
        };
        if maps
            .shadows_of
            .get(&tx)
            .map(|v| v.contains(&shadow_id))
            .unwrap_or(false)
        {
            Ok(Some(shadow_id))
        } else {
            Ok(None)
        }
    }

    /// Access to the underlying page store, for the CoW manager.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Release all mappings without freeing pages. The CoW manager must
    /// have already drained in-flight transactions.
    pub fn close(&self) -> Result<()> {
        *self.maps.write()? = Maps::default();
        *self.closed.write()? = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustlite_core::InMemoryPageStore;

    fn manager() -> ShadowManager<InMemoryPageStore> {
        ShadowManager::new(InMemoryPageStore::new())
    }

    #[test]
    fn create_shadow_copies_payload() {
        let mgr = manager();
        let original = mgr.store().allocate(PageType::Data).unwrap();
        let mut page = mgr.store().read(original).unwrap();
        page.data = b"hello".to_vec();
        mgr.store().write(page).unwrap();

        let shadow = mgr.create_shadow(1, original).unwrap();
        let shadow_page = mgr.store().read(shadow).unwrap();
        assert_eq!(shadow_page.data, b"hello");
        assert_eq!(mgr.get_original(shadow).unwrap(), Some(original));
        assert_eq!(mgr.get_shadow(original).unwrap(), Some(shadow));
    }

    #[test]
    fn repeated_shadow_for_same_tx_is_idempotent() {
        let mgr = manager();
        let original = mgr.store().allocate(PageType::Data).unwrap();
        let shadow1 = mgr.create_shadow(1, original).unwrap();
        let shadow2 = mgr.create_shadow(1, original).unwrap();
        assert_eq!(shadow1, shadow2);
    }

    #[test]
    fn cross_tx_shadow_conflicts() {
        let mgr = manager();
        let original = mgr.store().allocate(PageType::Data).unwrap();
        mgr.create_shadow(1, original).unwrap();
        let err = mgr.create_shadow(2, original).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn free_transaction_shadows_frees_pages_and_mappings() {
        let mgr = manager();
        let original = mgr.store().allocate(PageType::Data).unwrap();
        let shadow = mgr.create_shadow(1, original).unwrap();
        mgr.free_transaction_shadows(1).unwrap();

        assert!(mgr.store().read(shadow).is_err());
        assert_eq!(mgr.get_shadow(original).unwrap(), None);
        assert_eq!(mgr.shadows_of(1).unwrap(), Vec::<PageId>::new());
    }

    #[test]
    fn clear_transaction_mappings_keeps_pages() {
        let mgr = manager();
        let original = mgr.store().allocate(PageType::Data).unwrap();
        let shadow = mgr.create_shadow(1, original).unwrap();
        mgr.clear_transaction_mappings(1).unwrap();

        assert!(mgr.store().read(shadow).is_ok());
        assert_eq!(mgr.get_shadow(original).unwrap(), None);
    }

    #[test]
    fn operations_fail_after_close() {
        let mgr = manager();
        mgr.close().unwrap();
        assert!(matches!(mgr.create_shadow(1, 1), Err(Error::State(_))));
    }
}
