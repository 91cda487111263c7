//! Identifier types shared across the consortium crates
//!
//! Member, node and proposal identifiers are small integers assigned by the
//! governance state. Transaction identifiers pair a consensus view with a log
//! sequence number and render as `view.seqno`.

use crate::errors::ConsortiumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Member identifier within the consortium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl MemberId {
    /// Create a new member ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", self.0)
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Node identifier, referenced by trust/retire proposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Proposal identifier, unique for the lifetime of the governance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl ProposalId {
    /// Create a new proposal ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Get the next identifier in sequence
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proposal-{}", self.0)
    }
}

impl From<u64> for ProposalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Transaction identifier: a consensus view and a log position.
///
/// Ordered by view first, then seqno. Displays and parses as `view.seqno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId {
    /// Consensus epoch in which the transaction was proposed
    pub view: u64,
    /// Position in the replicated log
    pub seqno: u64,
}

impl TxId {
    /// Create a new transaction ID
    pub fn new(view: u64, seqno: u64) -> Self {
        Self { view, seqno }
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.view, self.seqno)
    }
}

impl FromStr for TxId {
    type Err = ConsortiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (view, seqno) = s
            .split_once('.')
            .ok_or_else(|| ConsortiumError::invalid(format!("malformed transaction id: {s}")))?;
        let view = view
            .parse::<u64>()
            .map_err(|e| ConsortiumError::invalid(format!("malformed view in {s}: {e}")))?;
        let seqno = seqno
            .parse::<u64>()
            .map_err(|e| ConsortiumError::invalid(format!("malformed seqno in {s}: {e}")))?;
        Ok(Self { view, seqno })
    }
}

/// Opaque reference to key material held by the crypto capability.
///
/// The core never sees private key bytes; it passes references such as a
/// member's encryption key or the archived network key to `CryptoEffects`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyRef(pub String);

impl KeyRef {
    /// Create a new key reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.0)
    }
}

impl From<&str> for KeyRef {
    fn from(reference: &str) -> Self {
        Self(reference.to_string())
    }
}
