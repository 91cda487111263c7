//! Proposals and their typed actions
//!
//! Governance changes are a closed set of actions. Each action checks its own
//! parameters at submission; whether it can be applied against the current
//! state is only known at enactment.

use consortium_core::{ConsortiumError, KeyRef, MemberId, NodeId, PhysicalTime, ProposalId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A governance action awaiting quorum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum ProposalAction {
    /// Admit a new member in `Accepted` status
    AddMember {
        /// Signing key reference
        public_key: KeyRef,
        /// Encryption key reference
        encryption_key: KeyRef,
        /// Opaque member data
        #[serde(default)]
        member_data: Value,
    },
    /// Retire an existing member
    RetireMember {
        /// Member to retire
        member: MemberId,
    },
    /// Replace a member's opaque data
    SetMemberData {
        /// Member to update
        member: MemberId,
        /// New data
        member_data: Value,
    },
    /// Register an application user
    AddUser {
        /// User key reference
        user_key: KeyRef,
        /// Opaque user data
        #[serde(default)]
        user_data: Value,
    },
    /// Mark a pending node as trusted
    TrustNode {
        /// Node to trust
        node: NodeId,
    },
    /// Retire a node
    RetireNode {
        /// Node to retire
        node: NodeId,
    },
    /// Allow a new code version to join
    NewCode {
        /// Hex-encoded SHA-256 digest of the code
        code_digest: String,
    },
    /// Change the number of shares needed for recovery
    SetRecoveryThreshold {
        /// New threshold
        threshold: usize,
    },
    /// Re-issue recovery shares to the current Active members
    UpdateRecoveryShares,
    /// Rotate the ledger secret
    Rekey,
    /// Install an application bundle
    SetApp {
        /// Application bundle, a JSON object
        bundle: Value,
    },
    /// Open the service to users
    OpenNetwork,
    /// Accept that the service is recovering and begin share collection
    AcceptRecovery,
}

impl ProposalAction {
    /// Action name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddMember { .. } => "add_member",
            Self::RetireMember { .. } => "retire_member",
            Self::SetMemberData { .. } => "set_member_data",
            Self::AddUser { .. } => "add_user",
            Self::TrustNode { .. } => "trust_node",
            Self::RetireNode { .. } => "retire_node",
            Self::NewCode { .. } => "new_code",
            Self::SetRecoveryThreshold { .. } => "set_recovery_threshold",
            Self::UpdateRecoveryShares => "update_recovery_shares",
            Self::Rekey => "rekey",
            Self::SetApp { .. } => "set_app",
            Self::OpenNetwork => "open_network",
            Self::AcceptRecovery => "accept_recovery",
        }
    }

    /// Check the action's parameters in isolation
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AddMember {
                public_key,
                encryption_key,
                ..
            } => {
                if public_key.is_empty() || encryption_key.is_empty() {
                    return Err(ConsortiumError::invalid(
                        "add_member requires a public key and an encryption key",
                    ));
                }
            }
            Self::AddUser { user_key, .. } => {
                if user_key.is_empty() {
                    return Err(ConsortiumError::invalid("add_user requires a user key"));
                }
            }
            Self::NewCode { code_digest } => {
                let bytes = hex::decode(code_digest).map_err(|e| {
                    ConsortiumError::invalid(format!("new_code digest is not hex: {e}"))
                })?;
                if bytes.len() != 32 {
                    return Err(ConsortiumError::invalid(
                        "new_code digest must be 32 bytes",
                    ));
                }
            }
            Self::SetRecoveryThreshold { threshold } => {
                if *threshold == 0 {
                    return Err(ConsortiumError::invalid(
                        "recovery threshold must be at least 1",
                    ));
                }
            }
            Self::SetApp { bundle } => {
                if !bundle.is_object() {
                    return Err(ConsortiumError::invalid(
                        "set_app bundle must be a JSON object",
                    ));
                }
            }
            Self::SetMemberData { .. }
            | Self::RetireMember { .. }
            | Self::TrustNode { .. }
            | Self::RetireNode { .. }
            | Self::UpdateRecoveryShares
            | Self::Rekey
            | Self::OpenNetwork
            | Self::AcceptRecovery => {}
        }
        Ok(())
    }
}

impl fmt::Display for ProposalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Proposal lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Accepting votes
    Open,
    /// Quorum reached and action enacted
    Accepted,
    /// Withdrawn by its proposer
    Withdrawn,
    /// Enough rejections that quorum is unreachable
    Rejected,
    /// Quorum reached but the action could not be enacted
    Failed,
    /// Proposer retired while the proposal was open
    Dropped,
}

impl ProposalState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Withdrawn => "withdrawn",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// A member's vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ballot {
    /// In favour
    Approve,
    /// Against
    Reject,
}

/// A proposal and its votes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal identifier
    pub id: ProposalId,
    /// Member who submitted it
    pub proposer: MemberId,
    /// Action to enact on quorum
    pub action: ProposalAction,
    /// Lifecycle state
    pub state: ProposalState,
    /// At most one ballot per member
    pub votes: BTreeMap<MemberId, Ballot>,
    /// Submission time
    pub created_at: PhysicalTime,
    /// Why enactment failed, for `Failed` proposals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Proposal {
    pub(crate) fn new(
        id: ProposalId,
        proposer: MemberId,
        action: ProposalAction,
        created_at: PhysicalTime,
    ) -> Self {
        Self {
            id,
            proposer,
            action,
            state: ProposalState::Open,
            votes: BTreeMap::new(),
            created_at,
            failure_reason: None,
        }
    }

    /// Whether `member` has voted
    pub fn has_voted(&self, member: &MemberId) -> bool {
        self.votes.contains_key(member)
    }
}

/// Externally visible view of a proposal's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSummary {
    /// Proposal identifier
    pub proposal_id: ProposalId,
    /// Proposer
    pub proposer: MemberId,
    /// Action name
    pub action: String,
    /// Lifecycle state
    pub state: ProposalState,
    /// Approvals from currently Active members
    pub approvals: usize,
    /// Rejections from currently Active members
    pub rejections: usize,
    /// Approvals currently needed
    pub threshold: usize,
    /// Why enactment failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
