//! JSON request dispatcher
//!
//! Maps transport operations onto node methods. Write operations require a
//! signed request; reads do not.

use crate::node::ConsortiumNode;
use consortium_core::{ConsortiumError, MemberId, NodeEffects, NodeId, ProposalId, Result, StateDigest};
use consortium_governance::{Ballot, ProposalAction};
use consortium_recovery::EncryptedShare;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Operations understood by [`ConsortiumNode::handle`]
pub mod ops {
    /// Submit a proposal
    pub const PROPOSE: &str = "propose";
    /// Vote on a proposal
    pub const VOTE: &str = "vote";
    /// Withdraw a proposal
    pub const WITHDRAW: &str = "withdraw";
    /// Re-evaluate a proposal
    pub const COMPLETE: &str = "complete";
    /// Fetch the digest to acknowledge
    pub const UPDATE_ACK_STATE_DIGEST: &str = "update_ack_state_digest";
    /// Acknowledge a digest
    pub const ACK: &str = "ack";
    /// Submit a recovery share
    pub const SUBMIT_RECOVERY_SHARE: &str = "submit_recovery_share";
    /// Read a proposal
    pub const PROPOSAL: &str = "proposal";
    /// Read a member
    pub const MEMBER: &str = "member";
    /// Read a node
    pub const NODE: &str = "node";
    /// Read the service state
    pub const SERVICE: &str = "service";
    /// Read the recovery coordinator status
    pub const RECOVERY: &str = "recovery";
}

/// Parameters of `propose`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeParams {
    /// Action to propose
    pub action: ProposalAction,
}

/// Parameters of `vote`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteParams {
    /// Proposal voted on
    pub proposal_id: ProposalId,
    /// Ballot cast
    pub ballot: Ballot,
}

/// Parameters naming a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalParams {
    /// Proposal
    pub proposal_id: ProposalId,
}

/// Parameters and result of the acknowledgement operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckParams {
    /// Digest being acknowledged
    pub state_digest: StateDigest,
}

/// Parameters of `submit_recovery_share`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareParams {
    /// Encrypted share
    pub share: EncryptedShare,
}

/// Parameters naming a member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberParams {
    /// Member
    pub member_id: MemberId,
}

/// Parameters naming a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeParams {
    /// Node
    pub node_id: NodeId,
}

fn parse<T: DeserializeOwned>(op: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| ConsortiumError::invalid(format!("malformed parameters for {op}: {e}")))
}

fn require_signed(op: &str, signed: bool) -> Result<()> {
    if signed {
        Ok(())
    } else {
        Err(ConsortiumError::unauthorized(format!("{op} requires a signed request")))
    }
}

impl<E: NodeEffects> ConsortiumNode<E> {
    /// Handle one request from `caller`
    pub async fn handle(
        &self,
        caller: MemberId,
        op: &str,
        params: Value,
        signed: bool,
    ) -> Result<Value> {
        debug!(caller = %caller, op, signed, "handling request");
        let response = match op {
            ops::PROPOSE => {
                require_signed(op, signed)?;
                let p: ProposeParams = parse(op, params)?;
                serde_json::to_value(self.submit_proposal(caller, p.action).await?)?
            }
            ops::VOTE => {
                let p: VoteParams = parse(op, params)?;
                serde_json::to_value(self.vote(caller, p.proposal_id, p.ballot, signed).await?)?
            }
            ops::WITHDRAW => {
                require_signed(op, signed)?;
                let p: ProposalParams = parse(op, params)?;
                serde_json::to_value(self.withdraw(caller, p.proposal_id)?)?
            }
            ops::COMPLETE => {
                require_signed(op, signed)?;
                let p: ProposalParams = parse(op, params)?;
                serde_json::to_value(self.complete_proposal(p.proposal_id).await?)?
            }
            ops::UPDATE_ACK_STATE_DIGEST => {
                require_signed(op, signed)?;
                let state_digest = self.update_ack_state_digest(caller)?;
                serde_json::to_value(AckParams { state_digest })?
            }
            ops::ACK => {
                require_signed(op, signed)?;
                let p: AckParams = parse(op, params)?;
                self.activate_member(caller, p.state_digest)?;
                json!({})
            }
            ops::SUBMIT_RECOVERY_SHARE => {
                require_signed(op, signed)?;
                let p: ShareParams = parse(op, params)?;
                serde_json::to_value(self.submit_share(caller, p.share).await?)?
            }
            ops::PROPOSAL => {
                let p: ProposalParams = parse(op, params)?;
                serde_json::to_value(self.proposal(p.proposal_id)?)?
            }
            ops::MEMBER => {
                let p: MemberParams = parse(op, params)?;
                serde_json::to_value(self.member(p.member_id)?)?
            }
            ops::NODE => {
                let p: NodeParams = parse(op, params)?;
                let status = self.node_status(p.node_id)?;
                json!({ "node_id": p.node_id, "status": status })
            }
            ops::SERVICE => serde_json::to_value(self.service())?,
            ops::RECOVERY => serde_json::to_value(self.recovery_status().await)?,
            _ => {
                return Err(ConsortiumError::not_found(format!(
                    "unknown operation {op}"
                )))
            }
        };
        Ok(response)
    }
}
