//! # RustLite Core
//!
//! Core types for the RustLite transactional storage engine: pages and
//! the `PageStore` boundary, the cache file codec, the transaction
//! manager, the multi-version store, and the `Wal` boundary trait. The
//! shadow/CoW page manager lives in `rustlite-storage`; snapshot and
//! garbage collection live in `rustlite-snapshot`. Both depend on this
//! crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache_file;
pub mod clock;
pub mod error;
pub mod format_version;
pub mod page;
pub mod snapshot_view;
pub mod transaction;
pub mod version;
pub mod wal_iface;

pub use clock::LogicalClock;
pub use error::{Error, Result};
pub use page::{InMemoryPageStore, Page, PageHeader, PageId, PageStore, PageType};
pub use snapshot_view::{is_visible, SnapshotView};
pub use transaction::{Transaction, TransactionId, TransactionManager, TransactionState};
pub use version::{Version, VersionSnapshot, VersionState, VersionStore, VersionStoreStats};
pub use wal_iface::{Lsn, Wal, WalRecord};
