//! # Consortium Recovery
//!
//! Coordinates threshold recovery of the ledger secret after a disaster.
//! Members submit their encrypted shares; once the recovery threshold is
//! reached the shares are combined through the crypto capability.

pub mod coordinator;
pub mod share;

pub use coordinator::{RecoveryCoordinator, RecoveryPhase, RecoveryStatus};
pub use share::{EncryptedShare, ShareOutcome};
