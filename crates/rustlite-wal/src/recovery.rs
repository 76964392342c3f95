// WAL recovery module - handles crash recovery logic
//
// Recovery is responsible for:
// 1. Reading all WAL records from disk
// 2. Tracking transaction boundaries (BEGIN/COMMIT/ABORT)
// 3. Only returning records from committed transactions (incomplete or
//    explicitly aborted transactions are treated as rolled back)
// 4. Handling corrupted or truncated records gracefully

use crate::record::RecordPayload;
use crate::{WalConfig, WalReader, WalRecord};
use rustlite_core::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Manages WAL recovery after crash or restart
pub struct RecoveryManager {
    config: WalConfig,
}

/// Represents a transaction's state during recovery
#[derive(Debug, Clone)]
struct TransactionState {
    /// Update records belonging to this transaction
    records: Vec<WalRecord>,
    /// Whether the transaction was committed
    committed: bool,
}

impl RecoveryManager {
    /// Create a new recovery manager with the given configuration
    pub fn new(config: WalConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Recover records from WAL
    ///
    /// This method:
    /// 1. Reads all records from all WAL segments
    /// 2. Tracks transaction boundaries
    /// 3. Only returns `Update` records from committed transactions
    /// 4. For `Update` records outside a transaction, returns them directly
    ///
    /// Transactions left open by a crash (a `Begin` with no matching
    /// `Commit`/`Abort`) are treated as aborted: their records are
    /// silently dropped.
    pub fn recover(&self) -> Result<Vec<WalRecord>> {
        let mut reader = WalReader::new(&self.config.wal_dir)?;

        if reader.segment_count() == 0 {
            return Ok(Vec::new());
        }

        let mut transactions: HashMap<u64, TransactionState> = HashMap::new();
        let mut standalone_records: Vec<WalRecord> = Vec::new();
        let mut current_tx_id: Option<u64> = None;

        loop {
            match reader.next_record() {
                Ok(Some(record)) => match &record.payload {
                    RecordPayload::Begin { tx_id } => {
                        transactions.insert(
                            *tx_id,
                            TransactionState {
                                records: Vec::new(),
                                committed: false,
                            },
                        );
                        current_tx_id = Some(*tx_id);
                    }
                    RecordPayload::Commit { tx_id } => {
                        if let Some(tx_state) = transactions.get_mut(tx_id) {
                            tx_state.committed = true;
                        }
                        if current_tx_id == Some(*tx_id) {
                            current_tx_id = None;
                        }
                    }
                    RecordPayload::Abort { tx_id } => {
                        transactions.remove(tx_id);
                        if current_tx_id == Some(*tx_id) {
                            current_tx_id = None;
                        }
                    }
                    RecordPayload::Update { .. } => {
                        if let Some(tx_id) = current_tx_id {
                            if let Some(tx_state) = transactions.get_mut(&tx_id) {
                                tx_state.records.push(record);
                            } else {
                                standalone_records.push(record);
                            }
                        } else {
                            standalone_records.push(record);
                        }
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    if Self::is_recoverable_error(&e) {
                        break;
                    }
                    return Err(e);
                }
            }
        }

        let mut result = standalone_records;

        let mut committed_txs: Vec<_> = transactions
            .into_iter()
            .filter(|(_, state)| state.committed)
            .collect();
        committed_txs.sort_by_key(|(tx_id, _)| *tx_id);

        for (_, tx_state) in committed_txs {
            result.extend(tx_state.records);
        }

        Ok(result)
    }

    /// Recover records with transaction markers included
    ///
    /// Unlike `recover()`, this method returns all records including
    /// `Begin` and `Commit` markers for committed transactions. Useful
    /// for replaying the exact WAL state.
    pub fn recover_with_markers(&self) -> Result<Vec<WalRecord>> {
        let mut reader = WalReader::new(&self.config.wal_dir)?;

        if reader.segment_count() == 0 {
            return Ok(Vec::new());
        }

        let mut committed_tx_ids: HashSet<u64> = HashSet::new();
        let mut all_records: Vec<WalRecord> = Vec::new();

        loop {
            match reader.next_record() {
                Ok(Some(record)) => {
                    if let RecordPayload::Commit { tx_id } = &record.payload {
                        committed_tx_ids.insert(*tx_id);
                    }
                    all_records.push(record);
                }
                Ok(None) => break,
                Err(e) => {
                    if Self::is_recoverable_error(&e) {
                        break;
                    }
                    return Err(e);
                }
            }
        }

        let mut result: Vec<WalRecord> = Vec::new();
        let mut current_tx_id: Option<u64> = None;
        let mut in_committed_tx = false;

        for record in all_records {
            let payload = &record.payload;
            let should_include = match payload {
                RecordPayload::Begin { tx_id } => {
                    in_committed_tx = committed_tx_ids.contains(tx_id);
                    current_tx_id = Some(*tx_id);
                    in_committed_tx
                }
                RecordPayload::Commit { tx_id } => {
                    let include = committed_tx_ids.contains(tx_id);
                    if current_tx_id == Some(*tx_id) {
                        current_tx_id = None;
                        in_committed_tx = false;
                    }
                    include
                }
                RecordPayload::Abort { tx_id } => {
                    if current_tx_id == Some(*tx_id) {
                        current_tx_id = None;
                        in_committed_tx = false;
                    }
                    false
                }
                RecordPayload::Update { .. } => {
                    if current_tx_id.is_some() {
                        in_committed_tx
                    } else {
                        true
                    }
                }
            };

            if should_include {
                result.push(record);
            }
        }

        Ok(result)
    }

    /// Check if an error is recoverable (we can continue without the corrupted data)
    fn is_recoverable_error(err: &Error) -> bool {
        match err {
            Error::Corruption(msg) => msg.contains("CRC mismatch"),
            Error::Serialization(msg) => msg.contains("Incomplete") || msg.contains("truncated"),
            _ => false,
        }
    }

    /// Get statistics about the WAL
    pub fn get_stats(&self) -> Result<RecoveryStats> {
        let mut reader = WalReader::new(&self.config.wal_dir)?;

        let mut stats = RecoveryStats {
            segment_count: reader.segment_count(),
            total_records: 0,
            update_records: 0,
            transactions_started: 0,
            transactions_committed: 0,
            transactions_aborted: 0,
            transactions_incomplete: 0,
        };

        let mut active_transactions: HashSet<u64> = HashSet::new();

        loop {
            match reader.next_record() {
                Ok(Some(record)) => {
                    stats.total_records += 1;
                    match &record.payload {
                        RecordPayload::Update { .. } => stats.update_records += 1,
                        RecordPayload::Begin { tx_id } => {
                            stats.transactions_started += 1;
                            active_transactions.insert(*tx_id);
                        }
                        RecordPayload::Commit { tx_id } => {
                            stats.transactions_committed += 1;
                            active_transactions.remove(tx_id);
                        }
                        RecordPayload::Abort { tx_id } => {
                            stats.transactions_aborted += 1;
                            active_transactions.remove(tx_id);
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        stats.transactions_incomplete = active_transactions.len();

        Ok(stats)
    }
}

/// Statistics about the WAL state
#[derive(Debug, Clone, Default)]
pub struct RecoveryStats {
    /// Number of segment files
    pub segment_count: usize,
    /// Total number of records
    pub total_records: usize,
    /// Number of UPDATE records
    pub update_records: usize,
    /// Number of transactions started
    pub transactions_started: usize,
    /// Number of transactions committed
    pub transactions_committed: usize,
    /// Number of transactions explicitly aborted
    pub transactions_aborted: usize,
    /// Number of incomplete transactions (started but neither committed nor aborted)
    pub transactions_incomplete: usize,
}
