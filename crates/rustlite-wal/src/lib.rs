//! # RustLite WAL (Write-Ahead Log)
//!
//! Write-Ahead Log implementation for RustLite, providing durable,
//! crash-recoverable transaction logging.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of RustLite.**
//! 
//! Users should depend on the main [`rustlite`](https://crates.io/crates/rustlite) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.
//!
//! ```toml
//! # In your Cargo.toml - use the main crate, not this one:
//! [dependencies]
//! rustlite = "0.3"
//! ```

// Write-Ahead Log (WAL) implementation for RustLite
// Provides durable, crash-recoverable transaction logging

use rustlite_core::Result;
use serde::{Deserialize, Serialize};

pub mod bridge;
pub mod reader;
pub mod record;
pub mod recovery;
pub mod segment;
pub mod writer;

pub use bridge::CoreWal;
pub use reader::WalReader;
pub use record::{RecordPayload, RecordType, WalRecord};
pub use recovery::{RecoveryManager, RecoveryStats};
pub use segment::{SegmentInfo, SegmentManager};
pub use writer::WalWriter;

/// WAL configuration options
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Sync mode: sync, async, or none
    pub sync_mode: SyncMode,
    /// Maximum segment size in bytes before rotation
    pub max_segment_size: u64,
    /// Directory path for WAL segments
    pub wal_dir: std::path::PathBuf,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Sync,
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            wal_dir: std::path::PathBuf::from("wal"),
        }
    }
}

/// Sync mode for WAL writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Call fsync after every write (strongest durability)
    Sync,
    /// Buffer writes, fsync on segment boundaries (balanced)
    Async,
    /// No fsync (fastest, unsafe for power loss)
    None,
}

/// WAL manager coordinates log writing and recovery
pub struct WalManager {
    config: WalConfig,
    writer: Option<WalWriter>,
}

impl WalManager {
    pub fn new(config: WalConfig) -> Result<Self> {
        Ok(Self {
            config,
            writer: None,
        })
    }

    /// Open the WAL for writing
    ///
    /// This creates or opens the current WAL segment for appending records.
    pub fn open(&mut self) -> Result<()> {
        let writer = WalWriter::new(
            &self.config.wal_dir,
            self.config.max_segment_size,
            self.config.sync_mode,
        )?;
        self.writer = Some(writer);

        Ok(())
    }

    /// Append a record to the WAL
    pub fn append(&mut self, record: WalRecord) -> Result<u64> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| rustlite_core::Error::State("WAL not opened".to_string()))?;
        writer.append(record)
    }

    /// Sync the WAL to disk
    pub fn sync(&mut self) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.sync()
        } else {
            Ok(())
        }
    }

    /// Close the WAL
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.sync()?;
        }
        Ok(())
    }

    /// Recover records from the WAL
    ///
    /// This reads all segments and returns committed records for replay.
    /// Incomplete transactions are rolled back (not included).
    pub fn recover(&self) -> Result<Vec<WalRecord>> {
        let recovery = RecoveryManager::new(self.config.clone())?;
        recovery.recover()
    }

    /// Recover records with transaction markers included
    ///
    /// Unlike `recover()`, this includes BEGIN and COMMIT markers.
    pub fn recover_with_markers(&self) -> Result<Vec<WalRecord>> {
        let recovery = RecoveryManager::new(self.config.clone())?;
        recovery.recover_with_markers()
    }

    /// Get statistics about the WAL
    pub fn stats(&self) -> Result<RecoveryStats> {
        let recovery = RecoveryManager::new(self.config.clone())?;
        recovery.get_stats()
    }

    /// Create a reader for the WAL
    pub fn reader(&self) -> Result<WalReader> {
        WalReader::new(&self.config.wal_dir)
    }

    /// Get a segment manager for the WAL
    pub fn segment_manager(&self) -> SegmentManager {
        SegmentManager::new(self.config.wal_dir.clone())
    }

    /// Get the current configuration
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Check if the WAL is open for writing
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// The sequence number that would be assigned to the next append, or 0
    /// if the WAL has not been opened yet.
    pub fn current_sequence(&self) -> u64 {
        self.writer.as_ref().map(|w| w.sequence()).unwrap_or(0)
    }
}
