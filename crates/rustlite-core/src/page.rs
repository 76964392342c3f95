//! Fixed-size pages and the `PageStore` abstraction the shadow/CoW managers
//! are built on.
//!
//! The crate does not ship a disk-backed page store; production callers
//! are expected to supply their own. [`InMemoryPageStore`] exists purely so
//! the rest of the core can be exercised and tested end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Identifies a page within a `PageStore`. Zero is never allocated.
pub type PageId = u64;

/// Coarse classification of a page's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Page holds version-store payload bytes.
    Data,
    /// Page is a shadow copy awaiting commit or rollback.
    Shadow,
}

/// Fixed metadata carried alongside every page's payload.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    /// This page's own id.
    pub page_id: PageId,
    /// Coarse page kind.
    pub page_type: PageType,
    /// Free-form status bits; opaque to the core.
    pub flags: u16,
    /// Number of logical items stored in the payload.
    pub item_count: u16,
    /// Bytes of payload still unused.
    pub free_space: u16,
}

/// A page: header plus payload bytes.
#[derive(Debug, Clone)]
pub struct Page {
    /// Page metadata.
    pub header: PageHeader,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl Page {
    /// Construct a page with a zeroed header for the given id and type.
    pub fn new(page_id: PageId, page_type: PageType, data: Vec<u8>) -> Self {
        Self {
            header: PageHeader {
                page_id,
                page_type,
                flags: 0,
                item_count: 0,
                free_space: 0,
            },
            data,
        }
    }
}

/// The external block-device abstraction the shadow/CoW managers operate
/// against. Implementations must be safe to call from multiple threads
/// concurrently.
pub trait PageStore: Send + Sync {
    /// Allocate a fresh page of the given type and return its id.
    fn allocate(&self, page_type: PageType) -> Result<PageId>;
    /// Read a page by id.
    fn read(&self, id: PageId) -> Result<Page>;
    /// Overwrite a page's contents. The page must already be allocated.
    fn write(&self, page: Page) -> Result<()>;
    /// Release a page back to the free list.
    fn free(&self, id: PageId) -> Result<()>;
}

impl PageStore for std::sync::Arc<dyn PageStore> {
    fn allocate(&self, page_type: PageType) -> Result<PageId> {
        (**self).allocate(page_type)
    }
    fn read(&self, id: PageId) -> Result<Page> {
        (**self).read(id)
    }
    fn write(&self, page: Page) -> Result<()> {
        (**self).write(page)
    }
    fn free(&self, id: PageId) -> Result<()> {
        (**self).free(id)
    }
}

/// Reference, in-memory `PageStore` used by the crate's own tests and by
/// callers that don't need durability.
pub struct InMemoryPageStore {
    next_id: AtomicU64,
    pages: RwLock<HashMap<PageId, Page>>,
}

impl InMemoryPageStore {
    /// Construct an empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for InMemoryPageStore {
    fn allocate(&self, page_type: PageType) -> Result<PageId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let page = Page::new(id, page_type, Vec::new());
        self.pages.write()?.insert(id, page);
        Ok(id)
    }

    fn read(&self, id: PageId) -> Result<Page> {
        self.pages
            .read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("page {id}")))
    }

    fn write(&self, page: Page) -> Result<()> {
        let mut pages = self.pages.write()?;
        if !pages.contains_key(&page.header.page_id) {
            return Err(Error::NotFound(format!("page {}", page.header.page_id)));
        }
        pages.insert(page.header.page_id, page);
        Ok(())
    }

    fn free(&self, id: PageId) -> Result<()> {
        self.pages
            .write()?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("page {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_read_write_free_round_trip() {
        let store = InMemoryPageStore::new();
        let id = store.allocate(PageType::Data).unwrap();
        let mut page = store.read(id).unwrap();
        page.data = b"hello".to_vec();
        store.write(page).unwrap();
        let read_back = store.read(id).unwrap();
        assert_eq!(read_back.data, b"hello");
        store.free(id).unwrap();
        assert!(store.read(id).is_err());
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let store = InMemoryPageStore::new();
        let a = store.allocate(PageType::Data).unwrap();
        let b = store.allocate(PageType::Data).unwrap();
        assert!(b > a);
    }

    #[test]
    fn write_to_unallocated_page_fails() {
        let store = InMemoryPageStore::new();
        let page = Page::new(999, PageType::Data, vec![]);
        assert!(store.write(page).is_err());
    }
}
