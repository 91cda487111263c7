//! # Consortium Commit
//!
//! Tracks transaction commit status as reported by replicas and checks that
//! the histories replicas report are consistent.
//!
//! - [`CommitStatusTracker`]: per-transaction status with monotonic transitions
//!   and at most one committed view per seqno
//! - [`reconstruct_history`]: rebuild the committed `view.seqno` sequence
//! - [`cross_check`]: compare two histories over their common prefix
//! - [`wait_for_commit`]: bounded wait for a transaction to commit

pub mod history;
pub mod source;
pub mod status;
pub mod tracker;
pub mod wait;

pub use history::{cross_check, parse_history, reconstruct_history};
pub use source::TxStatusSource;
pub use status::TxStatus;
pub use tracker::{CommitRecord, CommitStatusTracker};
pub use wait::wait_for_commit;
