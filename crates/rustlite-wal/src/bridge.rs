//! Bridges the segment-file-backed [`WalManager`] to the
//! [`rustlite_core::Wal`] boundary trait so the transaction manager and the
//! shadow/CoW page manager can depend on the trait without depending on
//! this crate's concrete types.

use crate::{WalConfig, WalManager, WalRecord as LocalRecord};
use rustlite_core::{Error, Lsn, Result, Wal, WalRecord as CoreRecord};
use std::sync::Mutex;

/// A [`Wal`] implementation over [`WalManager`].
///
/// `Wal`'s methods take `&self` so several transactions can append
/// concurrently; the underlying [`WalManager`] needs `&mut self` to write,
/// so access is serialized through a [`Mutex`]. This mirrors the
/// single-writer-at-a-time discipline any append-only log requires.
pub struct CoreWal {
    manager: Mutex<WalManager>,
}

impl CoreWal {
    /// Open (creating if necessary) the WAL at `config.wal_dir`.
    pub fn open(config: WalConfig) -> Result<Self> {
        let mut manager = WalManager::new(config)?;
        manager.open()?;
        Ok(Self {
            manager: Mutex::new(manager),
        })
    }
}

fn to_local(record: CoreRecord) -> LocalRecord {
    match record {
        CoreRecord::Begin { tx_id } => LocalRecord::begin(tx_id),
        CoreRecord::Commit { tx_id } => LocalRecord::commit(tx_id),
        CoreRecord::Abort { tx_id } => LocalRecord::abort(tx_id),
        CoreRecord::Update {
            tx_id,
            page_id,
            offset,
            before_image,
            after_image,
        } => LocalRecord::update(tx_id, page_id, offset, before_image, after_image),
    }
}

fn to_core(record: LocalRecord) -> CoreRecord {
    match record.payload {
        crate::RecordPayload::Begin { tx_id } => CoreRecord::Begin { tx_id },
        crate::RecordPayload::Commit { tx_id } => CoreRecord::Commit { tx_id },
        crate::RecordPayload::Abort { tx_id } => CoreRecord::Abort { tx_id },
        crate::RecordPayload::Update {
            tx_id,
            page_id,
            offset,
            before_image,
            after_image,
        } => CoreRecord::Update {
            tx_id,
            page_id,
            offset,
            before_image,
            after_image,
        },
    }
}

impl Wal for CoreWal {
    fn append(&self, record: CoreRecord) -> Result<Lsn> {
        let mut manager = self.manager.lock().map_err(|_| Error::LockPoisoned)?;
        manager.append(to_local(record))
    }

    fn sync(&self) -> Result<()> {
        let mut manager = self.manager.lock().map_err(|_| Error::LockPoisoned)?;
        manager.sync()
    }

    fn current_lsn(&self) -> Result<Lsn> {
        let manager = self.manager.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(manager.current_sequence())
    }
}

impl CoreWal {
    /// Replay the WAL tail: every `Update` record belonging to a committed
    /// transaction (or logged outside any transaction), in log order.
    /// Incomplete and aborted transactions are dropped, same as
    /// [`crate::RecoveryManager::recover`].
    pub fn recover(&self) -> Result<Vec<CoreRecord>> {
        let manager = self.manager.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(manager.recover()?.into_iter().map(to_core).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncMode;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WalConfig) {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        std::fs::create_dir_all(&wal_dir).unwrap();
        (
            dir,
            WalConfig {
                wal_dir,
                sync_mode: SyncMode::Sync,
                max_segment_size: 64 * 1024 * 1024,
            },
        )
    }

    #[test]
    fn append_and_sync_through_trait() {
        let (_dir, config) = setup();
        let wal = CoreWal::open(config).unwrap();

        let lsn0 = wal.current_lsn().unwrap();
        assert_eq!(lsn0, 0);

        wal.append(CoreRecord::Begin { tx_id: 1 }).unwrap();
        wal.append(CoreRecord::Update {
            tx_id: 1,
            page_id: 7,
            offset: 0,
            before_image: None,
            after_image: Some(b"v".to_vec()),
        })
        .unwrap();
        wal.append(CoreRecord::Commit { tx_id: 1 }).unwrap();
        wal.sync().unwrap();

        assert_eq!(wal.current_lsn().unwrap(), 3);
    }
}
