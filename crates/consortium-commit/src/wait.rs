//! Waiting for a transaction to commit

use crate::source::TxStatusSource;
use crate::status::TxStatus;
use crate::tracker::CommitStatusTracker;
use consortium_core::{
    poll_until, BackoffPolicy, ConsortiumError, Deadline, PhysicalTimeEffects, PollOutcome, Result,
    TxId,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Poll `source` until `tx` commits.
///
/// `Invalid` ends the wait with `TransactionInvalid`; an elapsed deadline
/// ends it with `Timeout`. Every observed status is folded into `tracker`.
pub async fn wait_for_commit<S, T>(
    source: &S,
    time: &T,
    tracker: &Mutex<CommitStatusTracker>,
    tx: TxId,
    deadline: Deadline,
    backoff: &BackoffPolicy,
) -> Result<()>
where
    S: TxStatusSource + ?Sized,
    T: PhysicalTimeEffects + ?Sized,
{
    let what = format!("commit of {tx}");
    poll_until(time, deadline, backoff, &what, move || async move {
        let status = source.tx_status(tx).await?;
        tracker.lock().observe(tx, status)?;
        match status {
            TxStatus::Committed => {
                debug!(%tx, "transaction committed");
                Ok(PollOutcome::Ready(()))
            }
            TxStatus::Invalid => {
                warn!(%tx, "transaction invalidated");
                Err(ConsortiumError::TransactionInvalid { tx })
            }
            TxStatus::Unknown | TxStatus::Pending => Ok(PollOutcome::Pending),
        }
    })
    .await
}
