//! Proposal registry and quorum voting
//!
//! The registry records proposals and ballots and decides when a proposal has
//! passed. It never enacts anything: a passed proposal stays `Open` until the
//! owning `Governance` enacts it and calls [`ProposalRegistry::finalize`].
//!
//! Tallies only count ballots from members in the `ActiveSet` passed to each
//! call, and the threshold is derived from that same set. The threshold can
//! therefore shift between votes if membership changes while a proposal is
//! open; [`ProposalRegistry::complete`] re-evaluates without a new ballot.

use crate::directory::ActiveSet;
use crate::proposal::{Ballot, Proposal, ProposalAction, ProposalState, ProposalSummary};
use consortium_core::{ConsortiumError, MemberId, PhysicalTime, ProposalId, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Approvals needed among `active_count` Active members
pub fn quorum_threshold(active_count: usize) -> usize {
    active_count / 2 + 1
}

/// Outcome of evaluating an open proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    /// Still open
    Open {
        /// Approvals from Active members
        approvals: usize,
        /// Rejections from Active members
        rejections: usize,
        /// Approvals needed
        threshold: usize,
    },
    /// Quorum reached; awaiting enactment
    Passed,
    /// Quorum can no longer be reached
    Rejected,
}

/// Owner of all proposals
#[derive(Debug, Clone)]
pub struct ProposalRegistry {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_id: ProposalId,
}

impl Default for ProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            proposals: BTreeMap::new(),
            next_id: ProposalId(0),
        }
    }

    /// Look up a proposal
    pub fn get(&self, id: &ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// Look up a proposal, failing with `NotFound`
    pub fn proposal(&self, id: &ProposalId) -> Result<&Proposal> {
        self.proposals
            .get(id)
            .ok_or_else(|| ConsortiumError::not_found(format!("{id} does not exist")))
    }

    /// Proposals still accepting votes
    pub fn open_proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals
            .values()
            .filter(|p| p.state == ProposalState::Open)
    }

    /// Create a proposal, optionally counting the proposer's approval
    pub fn submit(
        &mut self,
        proposer: MemberId,
        action: ProposalAction,
        active: &ActiveSet,
        created_at: PhysicalTime,
        proposer_votes: bool,
    ) -> Result<(ProposalId, Tally)> {
        if !active.contains(&proposer) {
            return Err(ConsortiumError::invalid(format!(
                "{proposer} is not an active member"
            )));
        }
        action.validate()?;

        let id = self.next_id;
        self.next_id = id.next();
        let mut proposal = Proposal::new(id, proposer, action, created_at);
        if proposer_votes {
            proposal.votes.insert(proposer, Ballot::Approve);
        }
        info!(proposal_id = %id, proposer = %proposer, action = %proposal.action, "proposal submitted");

        let tally = evaluate(&mut proposal, active);
        self.proposals.insert(id, proposal);
        Ok((id, tally))
    }

    /// Record a ballot and re-evaluate.
    ///
    /// Unsigned ballots and ballots from members outside `active` are refused.
    pub fn vote(
        &mut self,
        id: ProposalId,
        member: MemberId,
        ballot: Ballot,
        signed: bool,
        active: &ActiveSet,
    ) -> Result<Tally> {
        if !signed {
            warn!(proposal_id = %id, member = %member, "unsigned ballot refused");
            return Err(ConsortiumError::unauthorized(
                "ballots must be signed",
            ));
        }
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| ConsortiumError::not_found(format!("{id} does not exist")))?;
        if proposal.state != ProposalState::Open {
            return Err(ConsortiumError::state_conflict(format!(
                "{id} is {}",
                proposal.state
            )));
        }
        if !active.contains(&member) {
            warn!(proposal_id = %id, member = %member, "ballot from inactive member refused");
            return Err(ConsortiumError::unauthorized(format!(
                "{member} is not an active member"
            )));
        }
        if proposal.has_voted(&member) {
            return Err(ConsortiumError::DuplicateVote {
                proposal: id,
                member,
            });
        }

        proposal.votes.insert(member, ballot);
        let tally = evaluate(proposal, active);
        debug!(proposal_id = %id, member = %member, ?ballot, ?tally, "ballot recorded");
        Ok(tally)
    }

    /// Withdraw an open proposal; only its proposer may do so
    pub fn withdraw(&mut self, id: ProposalId, member: MemberId) -> Result<()> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| ConsortiumError::not_found(format!("{id} does not exist")))?;
        if proposal.proposer != member {
            return Err(ConsortiumError::unauthorized(format!(
                "only the proposer may withdraw {id}"
            )));
        }
        if proposal.state != ProposalState::Open {
            return Err(ConsortiumError::state_conflict(format!(
                "{id} is {}",
                proposal.state
            )));
        }
        proposal.state = ProposalState::Withdrawn;
        info!(proposal_id = %id, "proposal withdrawn");
        Ok(())
    }

    /// Re-evaluate an open proposal against `active` without a new ballot
    pub fn complete(&mut self, id: ProposalId, active: &ActiveSet) -> Result<Tally> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| ConsortiumError::not_found(format!("{id} does not exist")))?;
        if proposal.state != ProposalState::Open {
            return Err(ConsortiumError::state_conflict(format!(
                "{id} is {}",
                proposal.state
            )));
        }
        Ok(evaluate(proposal, active))
    }

    /// Record the enactment outcome of a passed proposal
    pub(crate) fn finalize(&mut self, id: ProposalId, outcome: std::result::Result<(), String>) {
        if let Some(proposal) = self.proposals.get_mut(&id) {
            match outcome {
                Ok(()) => {
                    proposal.state = ProposalState::Accepted;
                    info!(proposal_id = %id, action = %proposal.action, "proposal accepted");
                }
                Err(reason) => {
                    warn!(proposal_id = %id, action = %proposal.action, %reason, "proposal failed enactment");
                    proposal.state = ProposalState::Failed;
                    proposal.failure_reason = Some(reason);
                }
            }
        }
    }

    /// Drop every open proposal submitted by `proposer`
    pub(crate) fn drop_proposals_by(&mut self, proposer: MemberId) -> Vec<ProposalId> {
        let mut dropped = Vec::new();
        for proposal in self.proposals.values_mut() {
            if proposal.proposer == proposer && proposal.state == ProposalState::Open {
                proposal.state = ProposalState::Dropped;
                dropped.push(proposal.id);
            }
        }
        if !dropped.is_empty() {
            info!(proposer = %proposer, count = dropped.len(), "dropped proposals of retired member");
        }
        dropped
    }

    /// Summary of a proposal's progress against `active`
    pub fn summary(&self, id: &ProposalId, active: &ActiveSet) -> Result<ProposalSummary> {
        let proposal = self.proposal(id)?;
        let (approvals, rejections) = count(proposal, active);
        Ok(ProposalSummary {
            proposal_id: proposal.id,
            proposer: proposal.proposer,
            action: proposal.action.name().to_string(),
            state: proposal.state,
            approvals,
            rejections,
            threshold: active.quorum_threshold(),
            failure_reason: proposal.failure_reason.clone(),
        })
    }
}

fn count(proposal: &Proposal, active: &ActiveSet) -> (usize, usize) {
    proposal
        .votes
        .iter()
        .filter(|(member, _)| active.contains(member))
        .fold((0, 0), |(approvals, rejections), (_, ballot)| match ballot {
            Ballot::Approve => (approvals + 1, rejections),
            Ballot::Reject => (approvals, rejections + 1),
        })
}

/// Decide an open proposal. Marks it `Rejected` when quorum is unreachable.
fn evaluate(proposal: &mut Proposal, active: &ActiveSet) -> Tally {
    let (approvals, rejections) = count(proposal, active);
    let threshold = active.quorum_threshold();

    if approvals >= threshold {
        return Tally::Passed;
    }
    if rejections > active.len().saturating_sub(threshold) {
        proposal.state = ProposalState::Rejected;
        info!(proposal_id = %proposal.id, rejections, threshold, "proposal rejected");
        return Tally::Rejected;
    }
    Tally::Open {
        approvals,
        rejections,
        threshold,
    }
}
