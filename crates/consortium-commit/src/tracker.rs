//! Commit status tracker
//!
//! Folds statuses reported by replicas into one record per transaction and
//! rejects anything the replicated log can never legitimately report: a
//! status moving backwards, or two views committing the same seqno.

use crate::status::TxStatus;
use consortium_core::{ConsortiumError, Result, TxId};
use std::collections::BTreeMap;
use tracing::{error, trace};

/// One transaction's folded status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRecord {
    /// Transaction
    pub tx: TxId,
    /// Latest observed status
    pub status: TxStatus,
}

/// Validated `(view, seqno) -> status` history
#[derive(Debug, Clone, Default)]
pub struct CommitStatusTracker {
    records: BTreeMap<TxId, TxStatus>,
    committed: BTreeMap<u64, u64>,
}

impl CommitStatusTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `status` into the record for `tx`
    pub fn observe(&mut self, tx: TxId, status: TxStatus) -> Result<TxStatus> {
        let current = self.status(&tx);
        if !current.can_transition_to(status) {
            error!(%tx, from = %current, to = %status, "illegal commit status transition");
            return Err(ConsortiumError::InvalidTransition {
                tx,
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        if status == TxStatus::Committed {
            if let Some(&view) = self.committed.get(&tx.seqno) {
                if view != tx.view {
                    let mut views = vec![view, tx.view];
                    views.sort_unstable();
                    error!(seqno = tx.seqno, ?views, "conflicting commits");
                    return Err(ConsortiumError::ConflictingCommit {
                        seqno: tx.seqno,
                        views,
                    });
                }
            }
            self.committed.insert(tx.seqno, tx.view);
        }

        trace!(%tx, %status, "commit status observed");
        self.records.insert(tx, status);
        Ok(status)
    }

    /// Latest status of `tx`; `Unknown` if never observed
    pub fn status(&self, tx: &TxId) -> TxStatus {
        self.records.get(tx).copied().unwrap_or(TxStatus::Unknown)
    }

    /// View committed at `seqno`, if any
    pub fn committed_view(&self, seqno: u64) -> Option<u64> {
        self.committed.get(&seqno).copied()
    }

    /// All records in transaction order
    pub fn records(&self) -> impl Iterator<Item = CommitRecord> + '_ {
        self.records
            .iter()
            .map(|(tx, status)| CommitRecord { tx: *tx, status: *status })
    }

    /// Number of tracked transactions
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been observed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_monotonic_progress() {
        let mut tracker = CommitStatusTracker::new();
        let tx = TxId::new(2, 5);
        tracker.observe(tx, TxStatus::Unknown).unwrap();
        tracker.observe(tx, TxStatus::Pending).unwrap();
        tracker.observe(tx, TxStatus::Committed).unwrap();
        tracker.observe(tx, TxStatus::Committed).unwrap();
        assert_eq!(tracker.status(&tx), TxStatus::Committed);

        let err = tracker.observe(tx, TxStatus::Pending).unwrap_err();
        assert_matches!(err, ConsortiumError::InvalidTransition { .. });
        assert!(err.is_safety_violation());
        assert_eq!(tracker.status(&tx), TxStatus::Committed);
    }

    #[test]
    fn test_second_committed_view_conflicts() {
        let mut tracker = CommitStatusTracker::new();
        tracker.observe(TxId::new(1, 3), TxStatus::Committed).unwrap();
        tracker.observe(TxId::new(2, 3), TxStatus::Pending).unwrap();
        assert_matches!(
            tracker.observe(TxId::new(2, 3), TxStatus::Committed),
            Err(ConsortiumError::ConflictingCommit { seqno: 3, views }) if views == vec![1, 2]
        );
        assert_eq!(tracker.committed_view(3), Some(1));
    }

    #[test]
    fn test_invalid_is_terminal() {
        let mut tracker = CommitStatusTracker::new();
        let tx = TxId::new(1, 1);
        tracker.observe(tx, TxStatus::Invalid).unwrap();
        assert_matches!(
            tracker.observe(tx, TxStatus::Committed),
            Err(ConsortiumError::InvalidTransition { .. })
        );
    }
}
