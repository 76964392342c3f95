//! The write-ahead log boundary the core depends on but does not
//! implement. `rustlite-wal` provides the concrete, segment-file-backed
//! implementation of this trait.

use crate::error::Result;
use crate::page::PageId;

/// Log sequence number: a monotonic position in the WAL.
pub type Lsn = u64;

/// The four record kinds the core ever appends.
#[derive(Debug, Clone)]
pub enum WalRecord {
    /// A transaction has begun.
    Begin {
        /// Transaction id.
        tx_id: u64,
    },
    /// A transaction has committed.
    Commit {
        /// Transaction id.
        tx_id: u64,
    },
    /// A transaction has been rolled back.
    Abort {
        /// Transaction id.
        tx_id: u64,
    },
    /// A page was modified. `before_image` is set when first shadowing a
    /// page (the original contents); `after_image` is set when
    /// materializing the shadow into the original at commit time.
    Update {
        /// Owning transaction.
        tx_id: u64,
        /// Page being modified.
        page_id: PageId,
        /// Byte offset within the page the image covers.
        offset: u64,
        /// Contents before the change, if known.
        before_image: Option<Vec<u8>>,
        /// Contents after the change, if known.
        after_image: Option<Vec<u8>>,
    },
}

/// External write-ahead log collaborator.
///
/// Implementations must make `append` followed by `sync` durable before
/// `sync` returns, and must be safe to call from multiple threads.
pub trait Wal: Send + Sync {
    /// Append a record, returning its log sequence number.
    fn append(&self, record: WalRecord) -> Result<Lsn>;
    /// Force all appended records durably to disk.
    fn sync(&self) -> Result<()>;
    /// The LSN that would be assigned to the next `append`.
    fn current_lsn(&self) -> Result<Lsn>;
}
