//! Commit history reconstruction and cross-replica comparison

use crate::source::TxStatusSource;
use crate::status::TxStatus;
use crate::tracker::CommitStatusTracker;
use consortium_core::{ConsortiumError, Result, TxId};
use parking_lot::Mutex;
use tracing::{debug, error};

/// Rebuild the committed history up to `commit`.
///
/// For every seqno in `1..=commit.seqno`, probes every view in
/// `1..=commit.view` and requires exactly one to report `Committed`. Each
/// observation is folded into `tracker`, so transitions that contradict what
/// the tracker saw before are reported as well.
pub async fn reconstruct_history<S>(
    commit: TxId,
    source: &S,
    tracker: &Mutex<CommitStatusTracker>,
) -> Result<Vec<TxId>>
where
    S: TxStatusSource + ?Sized,
{
    // The commit point comes from callers; it only bounds the loop.
    let mut history = Vec::new();

    for seqno in 1..=commit.seqno {
        let mut committed_views = Vec::new();
        for view in 1..=commit.view {
            let tx = TxId::new(view, seqno);
            let status = source.tx_status(tx).await?;
            tracker.lock().observe(tx, status)?;
            if status == TxStatus::Committed {
                committed_views.push(view);
            }
        }

        match committed_views.as_slice() {
            [view] => history.push(TxId::new(*view, seqno)),
            [] => {
                error!(seqno, "no committed view below commit point");
                return Err(ConsortiumError::MissingCommit { seqno });
            }
            _ => {
                error!(seqno, views = ?committed_views, "conflicting commits");
                return Err(ConsortiumError::ConflictingCommit {
                    seqno,
                    views: committed_views,
                });
            }
        }
    }

    debug!(%commit, len = history.len(), "history reconstructed");
    Ok(history)
}

/// Compare two histories over their common prefix.
///
/// Returns the prefix length. Histories of different lengths are consistent
/// as long as the shorter is a prefix of the longer.
pub fn cross_check(a: &[TxId], b: &[TxId]) -> Result<usize> {
    for (index, (left, right)) in a.iter().zip(b.iter()).enumerate() {
        if left != right {
            error!(index, %left, %right, "histories diverge");
            return Err(ConsortiumError::DivergentHistory {
                index,
                left: *left,
                right: *right,
            });
        }
    }
    Ok(a.len().min(b.len()))
}

/// Parse `view.seqno` strings into a history
pub fn parse_history<I>(entries: I) -> Result<Vec<TxId>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| entry.as_ref().parse())
        .collect()
}
