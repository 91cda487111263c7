//! Tracker properties over arbitrary replica answers

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use consortium_commit::{CommitStatusTracker, TxStatus};
use consortium_testkit::strategies::{arb_committed_views, arb_tx_id, arb_tx_status};
use proptest::prelude::*;
use std::collections::BTreeMap;

proptest! {
    /// Once a transaction is reported terminal, the tracker never records
    /// anything else for it
    #[test]
    fn prop_terminal_status_is_sticky(
        observations in proptest::collection::vec((arb_tx_id(), arb_tx_status()), 0..64)
    ) {
        let mut tracker = CommitStatusTracker::new();
        let mut terminal: BTreeMap<_, TxStatus> = BTreeMap::new();

        for (tx, status) in observations {
            let _ = tracker.observe(tx, status);
            let recorded = tracker.status(&tx);
            if let Some(fixed) = terminal.get(&tx) {
                prop_assert_eq!(recorded, *fixed);
            } else if recorded.is_terminal() {
                terminal.insert(tx, recorded);
            }
        }
    }

    /// At most one view is ever recorded as committed for a seqno
    #[test]
    fn prop_one_committed_view_per_seqno(
        observations in proptest::collection::vec((arb_tx_id(), arb_tx_status()), 0..64)
    ) {
        let mut tracker = CommitStatusTracker::new();
        for (tx, status) in observations {
            let _ = tracker.observe(tx, status);
        }
        let mut committed: BTreeMap<u64, u64> = BTreeMap::new();
        for record in tracker.records() {
            if record.status == TxStatus::Committed {
                prop_assert!(committed.insert(record.tx.seqno, record.tx.view).is_none());
            }
        }
    }

    /// A linear history observed in order is accepted without complaint
    #[test]
    fn prop_linear_history_is_consistent(views in arb_committed_views()) {
        let mut tracker = CommitStatusTracker::new();
        for (i, view) in views.iter().enumerate() {
            let tx = consortium_core::TxId::new(*view, i as u64 + 1);
            prop_assert!(tracker.observe(tx, TxStatus::Pending).is_ok());
            prop_assert!(tracker.observe(tx, TxStatus::Committed).is_ok());
        }
        prop_assert_eq!(tracker.len(), views.len());
    }
}
