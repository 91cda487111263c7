//! Unified error type for consortium governance
//!
//! One error enum covers every crate in the workspace. Each variant belongs to
//! exactly one [`ErrorKind`], which callers use to decide whether to retry,
//! report or abort. Errors serialize so they can cross the transport intact.

use crate::effects::{CryptoError, TimeError, TransportError};
use crate::identifiers::{MemberId, ProposalId, TxId};
use serde::{Deserialize, Serialize};

/// Classification of a [`ConsortiumError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input or unknown identifiers
    Validation,
    /// Caller is not allowed to perform the operation
    Authorization,
    /// Operation conflicts with the current state of the entity
    StateConflict,
    /// The observed system broke a correctness invariant
    SafetyViolation,
    /// A bounded wait exceeded its deadline
    Timeout,
    /// Failure reported by an external collaborator
    External,
}

impl ErrorKind {
    /// HTTP-style status code used when the error crosses the transport
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authorization => 403,
            ErrorKind::StateConflict => 409,
            ErrorKind::SafetyViolation => 500,
            ErrorKind::Timeout => 504,
            ErrorKind::External => 502,
        }
    }
}

/// Unified error type for all consortium operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConsortiumError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Unknown identifier
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Caller lacks the status or role the operation requires
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the authorization failure
        message: String,
    },

    /// Transition attempted on a terminal or wrong-state entity
    #[error("State conflict: {message}")]
    StateConflict {
        /// Description of the conflicting state
        message: String,
    },

    /// Member already voted on this proposal
    #[error("{member} has already voted on {proposal}")]
    DuplicateVote {
        /// Proposal being voted on
        proposal: ProposalId,
        /// Member who voted twice
        member: MemberId,
    },

    /// Member already submitted a recovery share in this epoch
    #[error("{member} has already submitted a recovery share")]
    DuplicateShare {
        /// Member who submitted twice
        member: MemberId,
    },

    /// Acknowledgement was made against an outdated state digest
    #[error("{member} acknowledged a stale state digest")]
    StaleAck {
        /// Member whose acknowledgement was rejected
        member: MemberId,
    },

    /// Recovery already completed; no further shares are accepted
    #[error("Recovery already complete")]
    RecoveryAlreadyComplete,

    /// Transaction was marked invalid and will never commit
    #[error("Transaction {tx} is invalid and will never be committed")]
    TransactionInvalid {
        /// Transaction that was invalidated
        tx: TxId,
    },

    /// Commit status moved in a way the log can never legally move
    #[error("Illegal status transition for {tx}: {from} -> {to}")]
    InvalidTransition {
        /// Transaction whose status regressed
        tx: TxId,
        /// Previously recorded status
        from: String,
        /// Newly reported status
        to: String,
    },

    /// More than one view reported Committed for the same seqno
    #[error("Conflicting commits for seqno {seqno} in views {views:?}")]
    ConflictingCommit {
        /// Log position with multiple committed views
        seqno: u64,
        /// Views that reported Committed
        views: Vec<u64>,
    },

    /// No view reported Committed for a seqno below the commit point
    #[error("No committed view found for seqno {seqno}")]
    MissingCommit {
        /// Log position with no committed view
        seqno: u64,
    },

    /// Two histories disagree inside their common prefix
    #[error("Divergent history at index {index}: {left} != {right}")]
    DivergentHistory {
        /// Position of the first mismatch
        index: usize,
        /// Entry from the first history
        left: TxId,
        /// Entry from the second history
        right: TxId,
    },

    /// A bounded wait exceeded its deadline
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout {
        /// Condition being waited on
        what: String,
        /// Time spent before giving up
        waited_ms: u64,
    },

    /// Transport failure, propagated unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Crypto capability failure, propagated unchanged
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Time capability failure, propagated unchanged
    #[error(transparent)]
    Time(#[from] TimeError),

    /// Error response from a remote endpoint that could not be decoded
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// Status code carried by the response
        status: u16,
        /// Raw error text
        message: String,
    },
}

impl ConsortiumError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a state conflict error
    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::StateConflict {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            waited_ms,
        }
    }

    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } | Self::NotFound { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Authorization,
            Self::StateConflict { .. }
            | Self::DuplicateVote { .. }
            | Self::DuplicateShare { .. }
            | Self::StaleAck { .. }
            | Self::RecoveryAlreadyComplete
            | Self::TransactionInvalid { .. } => ErrorKind::StateConflict,
            Self::InvalidTransition { .. }
            | Self::ConflictingCommit { .. }
            | Self::MissingCommit { .. }
            | Self::DivergentHistory { .. } => ErrorKind::SafetyViolation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(_) | Self::Crypto(_) | Self::Time(_) => ErrorKind::External,
            Self::Remote { status, .. } => match status {
                400 | 404 => ErrorKind::Validation,
                401 | 403 => ErrorKind::Authorization,
                409 => ErrorKind::StateConflict,
                504 => ErrorKind::Timeout,
                _ => ErrorKind::External,
            },
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::StateConflict { .. } => "state_conflict",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::DuplicateShare { .. } => "duplicate_share",
            Self::StaleAck { .. } => "stale_ack",
            Self::RecoveryAlreadyComplete => "recovery_already_complete",
            Self::TransactionInvalid { .. } => "transaction_invalid",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConflictingCommit { .. } => "conflicting_commit",
            Self::MissingCommit { .. } => "missing_commit",
            Self::DivergentHistory { .. } => "divergent_history",
            Self::Timeout { .. } => "timeout",
            Self::Transport(_) => "transport",
            Self::Crypto(_) => "crypto",
            Self::Time(_) => "time",
            Self::Remote { .. } => "remote",
        }
    }

    /// Whether this error indicates a correctness failure in the observed system
    pub fn is_safety_violation(&self) -> bool {
        self.kind() == ErrorKind::SafetyViolation
    }

    /// Whether a caller may retry the operation that produced this error.
    ///
    /// Only timeouts are retryable here; transport errors are left to the
    /// caller's own policy and safety violations are never retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// Standard Result type for consortium operations
pub type Result<T> = std::result::Result<T, ConsortiumError>;

impl From<serde_json::Error> for ConsortiumError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(format!("malformed JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ConsortiumError::invalid("test message");
        assert!(matches!(err, ConsortiumError::Invalid { .. }));
        assert_eq!(err.to_string(), "Invalid: test message");
    }

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            ConsortiumError::DuplicateShare { member: MemberId(1) }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            ConsortiumError::MissingCommit { seqno: 3 }.kind(),
            ErrorKind::SafetyViolation
        );
        assert_eq!(
            ConsortiumError::unauthorized("retired").kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            ConsortiumError::Transport(TransportError::Unreachable {
                endpoint: "n0".into()
            })
            .kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(ConsortiumError::timeout("commit", 100).is_retryable());
        assert!(!ConsortiumError::ConflictingCommit {
            seqno: 1,
            views: vec![1, 2]
        }
        .is_retryable());
    }

    #[test]
    fn test_serde_preserves_variant() {
        let err = ConsortiumError::StaleAck {
            member: MemberId(2),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ConsortiumError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
