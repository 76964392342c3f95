//! CoW Manager (component D).
//!
//! Coordinates reads, modifications, and durable publication of pages
//! across a transaction, on top of the [`ShadowManager`]. Before a
//! transaction commits, writes land only in shadow pages; the original is
//! never touched until `commit_pages` materializes the shadow's contents
//! into it and syncs the WAL.

use std::sync::{Arc, RwLock};

use tracing::{debug, instrument, warn};

use rustlite_core::{Error, Page, PageId, PageStore, Result, Transaction, Wal, WalRecord};

use crate::shadow::ShadowManager;

/// Read/modify/commit/rollback over pages using shadows.
pub struct CowManager<S: PageStore> {
    shadow: ShadowManager<S>,
    wal: Arc<dyn Wal>,
    lock: RwLock<()>,
}

impl<S: PageStore> CowManager<S> {
    /// Build a CoW manager over `store`, durably logging page images to
    /// `wal`.
    pub fn new(store: S, wal: Arc<dyn Wal>) -> Self {
        Self {
            shadow: ShadowManager::new(store),
            wal,
            lock: RwLock::new(()),
        }
    }

    /// Read `id` as `tx` currently sees it: the transaction's own shadow if
    /// it has modified the page, otherwise the original.
    #[instrument(skip(self, tx))]
    pub fn get_page(&self, tx: &Transaction, id: PageId) -> Result<Page> {
        let _guard = self.lock.read()?;
        let page = match self.shadow.owns_shadow_of(tx.id(), id)? {
            Some(shadow_id) => self.shadow.store().read(shadow_id)?,
            None => self.shadow.store().read(id)?,
        };
        tx.record_read(id)?;
        Ok(page)
    }

    /// Obtain a writable shadow of `id` for `tx`, creating one (and logging
    /// its before-image) if this is the transaction's first write to the
    /// page.
    #[instrument(skip(self, tx))]
    pub fn modify_page(&self, tx: &Transaction, id: PageId) -> Result<Page> {
        let _guard = self.lock.write()?;

        if let Some(shadow_id) = self.shadow.owns_shadow_of(tx.id(), id)? {
            return self.shadow.store().read(shadow_id);
        }

        let original = self.shadow.store().read(id)?;
        let shadow_id = self.shadow.create_shadow(tx.id(), id)?;

        let record = WalRecord::Update {
            tx_id: tx.id(),
            page_id: id,
            offset: 0,
            before_image: Some(original.data.clone()),
            after_image: None,
        };
        if let Err(e) = self.wal.append(record) {
            // Roll back the shadow we just allocated; this transaction is
            // the only owner so this cannot race.
            let _ = self.shadow.free_shadow(id);
            return Err(Error::Durability(format!("WAL append failed: {e}")));
        }

        tx.record_write(id)?;
        debug!(tx_id = tx.id(), page_id = id, shadow_id, "page shadowed");
        self.shadow.store().read(shadow_id)
    }

    /// Overwrite the shadow `tx` holds for `original_id` with `page`.
    pub fn write_shadow_page(
        &self,
        tx: &Transaction,
        original_id: PageId,
        mut page: Page,
    ) -> Result<()> {
        let _guard = self.lock.write()?;
        let shadow_id = self
            .shadow
            .owns_shadow_of(tx.id(), original_id)?
            .ok_or_else(|| {
                Error::State(format!(
                    "transaction {} does not own a shadow of page {original_id}",
                    tx.id()
                ))
            })?;
        page.header.page_id = shadow_id;
        self.shadow.store().write(page)
    }

    /// Materialize every shadow `tx` holds into its original page, log the
    /// after-images, sync the WAL, and release the shadows.
    #[instrument(skip(self, tx))]
    pub fn commit_pages(&self, tx: &Transaction) -> Result<()> {
        let _guard = self.lock.write()?;

        let shadows = self.shadow.shadows_of(tx.id())?;
        for shadow_id in &shadows {
            let original_id = self.shadow.get_original(*shadow_id)?.ok_or_else(|| {
                Error::State(format!("shadow {shadow_id} has no recorded original"))
            })?;
            let shadow_page = self.shadow.store().read(*shadow_id)?;

            self.wal.append(WalRecord::Update {
                tx_id: tx.id(),
                page_id: original_id,
                offset: 0,
                before_image: None,
                after_image: Some(shadow_page.data.clone()),
            })?;

            let mut materialized = Page::new(original_id, shadow_page.header.page_type, shadow_page.data);
            materialized.header.flags = shadow_page.header.flags;
            materialized.header.item_count = shadow_page.header.item_count;
            materialized.header.free_space = shadow_page.header.free_space;
            self.shadow.store().write(materialized)?;
        }

        self.wal.sync()?;

        for shadow_id in &shadows {
            if let Err(e) = self.shadow.store().free(*shadow_id) {
                warn!(shadow_id, error = %e, "failed to free shadow page after commit");
            }
        }
        self.shadow.clear_transaction_mappings(tx.id())?;
        debug!(tx_id = tx.id(), pages = shadows.len(), "committed pages");
        Ok(())
    }

    /// Discard every shadow `tx` holds; originals are untouched.
    pub fn rollback_pages(&self, tx: &Transaction) -> Result<()> {
        let _guard = self.lock.write()?;
        self.shadow.free_transaction_shadows(tx.id())
    }

    /// The underlying page store, for callers that need direct access
    /// (e.g. to allocate a brand-new page before its first write).
    pub fn store(&self) -> &S {
        self.shadow.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustlite_core::{InMemoryPageStore, LogicalClock, PageType, TransactionManager};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeWal {
        lsn: AtomicU64,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl FakeWal {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                lsn: AtomicU64::new(0),
                fail_next: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    impl Wal for FakeWal {
        fn append(&self, _record: WalRecord) -> Result<u64> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::Durability("simulated failure".to_string()));
            }
            Ok(self.lsn.fetch_add(1, Ordering::SeqCst))
        }
        fn sync(&self) -> Result<()> {
            Ok(())
        }
        fn current_lsn(&self) -> Result<u64> {
            Ok(self.lsn.load(Ordering::SeqCst))
        }
    }

    fn setup() -> (Arc<TransactionManager>, CowManager<InMemoryPageStore>, PageId) {
        let wal = FakeWal::new();
        let mgr = TransactionManager::new(wal.clone(), Arc::new(LogicalClock::new()));
        let cow = CowManager::new(InMemoryPageStore::new(), wal);
        let page_id = cow.store().allocate(PageType::Data).unwrap();
        let mut page = cow.store().read(page_id).unwrap();
        page.data = b"original".to_vec();
        cow.store().write(page).unwrap();
        (mgr, cow, page_id)
    }

    #[test]
    fn get_page_returns_original_before_any_write() {
        let (mgr, cow, page_id) = setup();
        let tx = mgr.begin().unwrap();
        let page = cow.get_page(&tx, page_id).unwrap();
        assert_eq!(page.data, b"original");
        assert_eq!(tx.read_set().unwrap(), vec![page_id]);
    }

    #[test]
    fn modify_then_get_sees_shadow() {
        let (mgr, cow, page_id) = setup();
        let tx = mgr.begin().unwrap();
        let mut shadow = cow.modify_page(&tx, page_id).unwrap();
        shadow.data = b"modified".to_vec();
        cow.write_shadow_page(&tx, page_id, shadow).unwrap();

        let seen = cow.get_page(&tx, page_id).unwrap();
        assert_eq!(seen.data, b"modified");
        assert_eq!(tx.write_set().unwrap(), vec![page_id]);
    }

    #[test]
    fn original_untouched_until_commit() {
        let (mgr, cow, page_id) = setup();
        let tx = mgr.begin().unwrap();
        let mut shadow = cow.modify_page(&tx, page_id).unwrap();
        shadow.data = b"modified".to_vec();
        cow.write_shadow_page(&tx, page_id, shadow).unwrap();

        let original = cow.store().read(page_id).unwrap();
        assert_eq!(original.data, b"original");

        cow.commit_pages(&tx).unwrap();
        let after = cow.store().read(page_id).unwrap();
        assert_eq!(after.data, b"modified");
    }

    #[test]
    fn rollback_leaves_original_untouched() {
        let (mgr, cow, page_id) = setup();
        let tx = mgr.begin().unwrap();
        let mut shadow = cow.modify_page(&tx, page_id).unwrap();
        shadow.data = b"modified".to_vec();
        cow.write_shadow_page(&tx, page_id, shadow).unwrap();

        cow.rollback_pages(&tx).unwrap();
        let original = cow.store().read(page_id).unwrap();
        assert_eq!(original.data, b"original");
    }

    #[test]
    fn cross_transaction_modify_conflicts() {
        let (mgr, cow, page_id) = setup();
        let tx1 = mgr.begin().unwrap();
        let tx2 = mgr.begin().unwrap();
        cow.modify_page(&tx1, page_id).unwrap();
        let err = cow.modify_page(&tx2, page_id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
