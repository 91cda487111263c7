//! Multi-member flows
//!
//! Drives a set of member clients toward an outcome: enough approvals for a
//! proposal to pass, or enough shares for recovery to complete. Which member
//! acts next is decided by a [`SelectionStrategy`], so runs are reproducible
//! under a fixed seed.

use crate::member::{MemberClient, ShareSubmission};
use consortium_core::{
    ClientEffects, ConsortiumConfig, ConsortiumError, ErrorKind, MemberId, ProposalId, Result,
    SelectionStrategy,
};
use consortium_governance::{Ballot, ProposalAction, ProposalState, ProposalSummary};
use consortium_recovery::ShareOutcome;
use tracing::{debug, info, warn};

/// Coordinates several member clients
pub struct Orchestrator<E> {
    clients: Vec<MemberClient<E>>,
    strategy: SelectionStrategy,
}

impl<E: ClientEffects> Orchestrator<E> {
    /// Orchestrator over `clients`
    pub fn new(clients: Vec<MemberClient<E>>, strategy: SelectionStrategy) -> Self {
        Self { clients, strategy }
    }

    /// Orchestrator whose strategy comes from `config.selection`
    pub fn from_config(clients: Vec<MemberClient<E>>, config: &ConsortiumConfig) -> Self {
        Self::new(clients, SelectionStrategy::from_seed(config.selection.seed))
    }

    /// All clients
    pub fn clients(&self) -> &[MemberClient<E>] {
        &self.clients
    }

    /// Client for `member`
    pub fn client(&self, member: MemberId) -> Option<&MemberClient<E>> {
        self.clients.iter().find(|c| c.member_id() == member)
    }

    fn order(&mut self) -> Vec<usize> {
        self.strategy.order((0..self.clients.len()).collect())
    }

    /// Propose `action` from a selected member and vote until it passes
    pub async fn propose_and_accept(&mut self, action: ProposalAction) -> Result<ProposalSummary> {
        let order = self.order();
        let proposer = order
            .first()
            .and_then(|&i| self.clients.get(i))
            .ok_or_else(|| ConsortiumError::invalid("no member clients"))?;
        let summary = proposer.propose(action).await?;
        match summary.state {
            ProposalState::Accepted => Ok(summary),
            ProposalState::Open => self.vote_until_accepted(summary.proposal_id).await,
            state => Err(ConsortiumError::state_conflict(format!(
                "{} ended {state}",
                summary.proposal_id
            ))),
        }
    }

    /// Approve `proposal_id` from selected members until it is accepted.
    ///
    /// Members that already voted or are not Active are skipped.
    pub async fn vote_until_accepted(&mut self, proposal_id: ProposalId) -> Result<ProposalSummary> {
        for index in self.order() {
            let client = &self.clients[index];
            match client.vote(proposal_id, Ballot::Approve).await {
                Ok(summary) if summary.state == ProposalState::Accepted => {
                    info!(proposal_id = %proposal_id, member = %client.member_id(), "quorum reached");
                    return Ok(summary);
                }
                Ok(summary) if summary.state.is_terminal() => {
                    return Err(ConsortiumError::state_conflict(format!(
                        "{proposal_id} ended {}",
                        summary.state
                    )));
                }
                Ok(summary) => {
                    debug!(
                        proposal_id = %proposal_id,
                        approvals = summary.approvals,
                        threshold = summary.threshold,
                        "vote counted"
                    );
                }
                Err(ConsortiumError::DuplicateVote { .. }) => {}
                Err(e) if e.kind() == ErrorKind::Authorization => {
                    warn!(member = %client.member_id(), error = %e, "member cannot vote");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConsortiumError::state_conflict(format!(
            "{proposal_id} did not reach quorum"
        )))
    }

    /// Submit shares from selected members until recovery completes.
    ///
    /// Returns the completed recovery epoch. Shares already counted are not
    /// resubmitted; members without a share or without voting rights are
    /// skipped.
    pub async fn submit_shares_until_recovered(&mut self) -> Result<u64> {
        for index in self.order() {
            let client = &self.clients[index];
            match client.submit_recovery_share_idempotent().await {
                Ok(ShareSubmission::Counted(ShareOutcome::Recovered { epoch })) => {
                    info!(epoch, member = %client.member_id(), "recovery completed");
                    return Ok(epoch);
                }
                Ok(ShareSubmission::Counted(ShareOutcome::Pending { submitted, threshold })) => {
                    debug!(submitted, threshold, member = %client.member_id(), "share counted");
                }
                Ok(ShareSubmission::AlreadyCounted) => {}
                Err(ConsortiumError::RecoveryAlreadyComplete) => {
                    return Ok(client.recovery_status().await?.epoch);
                }
                Err(e) if matches!(e.kind(), ErrorKind::Authorization | ErrorKind::Validation) => {
                    warn!(member = %client.member_id(), error = %e, "member cannot submit a share");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConsortiumError::state_conflict(
            "recovery threshold not reached",
        ))
    }
}
