//! The plain-data view of a snapshot that the Version Store checks
//! versions against. [`SnapshotView`] itself carries no reference
//! counting or registry bookkeeping — that is the Snapshot Manager's job
//! (`rustlite-snapshot`), built on top of this type so the Version Store
//! (which lives in this crate) never has to depend upward on it.

use crate::transaction::TransactionId;

/// A logical timestamp plus the set of transactions in flight at that
/// instant, from the perspective of one transaction.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    /// Logical time the snapshot was taken at.
    pub timestamp: u64,
    /// Transactions active at that moment, excluding `tx_id`.
    pub active_tx_ids: Vec<u64>,
    /// The transaction this view belongs to (sees its own uncommitted
    /// writes).
    pub tx_id: TransactionId,
}

/// The snapshot-isolation visibility predicate (component F).
///
/// Four rules, checked in order:
/// 1. An uncommitted version (`commit_ts == 0`) is visible only to its
///    own transaction.
/// 2. A version committed after the snapshot was taken is never visible.
/// 3. A version written by a transaction that was itself active at
///    snapshot time is not visible, even if its `commit_ts` happens to be
///    `<= timestamp` — this is required for snapshot isolation and must
///    not be relaxed.
/// 4. Otherwise, visible.
pub fn is_visible(commit_ts: u64, version_tx_id: TransactionId, view: &SnapshotView) -> bool {
    if commit_ts == 0 {
        return version_tx_id == view.tx_id;
    }
    if commit_ts > view.timestamp {
        return false;
    }
    if view.active_tx_ids.contains(&version_tx_id) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(timestamp: u64, active: Vec<u64>, tx_id: u64) -> SnapshotView {
        SnapshotView {
            timestamp,
            active_tx_ids: active,
            tx_id,
        }
    }

    #[test]
    fn own_uncommitted_write_is_visible() {
        let v = view(100, vec![], 5);
        assert!(is_visible(0, 5, &v));
    }

    #[test]
    fn other_uncommitted_write_is_not_visible() {
        let v = view(100, vec![], 5);
        assert!(!is_visible(0, 6, &v));
    }

    #[test]
    fn future_commit_is_not_visible() {
        let v = view(100, vec![], 5);
        assert!(!is_visible(101, 6, &v));
    }

    #[test]
    fn commit_by_concurrently_active_writer_is_not_visible() {
        // rule 3: even though commit_ts <= timestamp, tx 6 was active at
        // snapshot time, so its commit must not be observed.
        let v = view(100, vec![6], 5);
        assert!(!is_visible(50, 6, &v));
    }

    #[test]
    fn ordinary_past_commit_is_visible() {
        let v = view(100, vec![], 5);
        assert!(is_visible(50, 6, &v));
    }
}
