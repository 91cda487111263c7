//! # Consortium Core
//!
//! Foundation types shared by every consortium crate: identifiers, the
//! unified [`ConsortiumError`], the effect traits through which the core
//! reaches the ledger, keys and clock, bounded waits, configuration and
//! member selection.
//!
//! Nothing in this crate performs I/O on its own. Governance state machines
//! live in `consortium-governance`, recovery in `consortium-recovery` and
//! commit tracking in `consortium-commit`.

pub mod config;
pub mod digest;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod selection;
pub mod wait;

pub use config::{
    Config, ConsortiumConfig, GovernanceConfig, RecoveryConfig, SelectionConfig, WaitConfig,
};
pub use digest::StateDigest;
pub use effects::{
    ClientEffects, ConsortiumEffects, CryptoEffects, CryptoError, DecryptedShare,
    GovernanceReadEffects, NodeEffects, PhysicalTime, PhysicalTimeEffects, RealTimeHandler,
    RecoveredSecret, TimeError, TransportEffects, TransportError, TransportResponse,
};
pub use errors::{ConsortiumError, ErrorKind, Result};
pub use identifiers::{KeyRef, MemberId, NodeId, ProposalId, TxId};
pub use selection::SelectionStrategy;
pub use wait::{poll_until, BackoffPolicy, Deadline, PollOutcome};
