//! Governance state container
//!
//! `Governance` owns the member directory, the proposal registry, the node
//! table and the service state, and is the only place a passed proposal is
//! enacted. Enactment checks the action against current state first; if the
//! check fails the proposal becomes `Failed` and nothing is mutated.

use crate::directory::{ActiveSet, MemberDirectory};
use crate::member::{Member, MemberInfo, MemberStatus};
use crate::nodes::{NodeStatus, NodeTable};
use crate::proposal::{Ballot, ProposalAction, ProposalState, ProposalSummary};
use crate::registry::{ProposalRegistry, Tally};
use consortium_core::{
    ConsortiumConfig, ConsortiumError, GovernanceConfig, KeyRef, MemberId, NodeId, PhysicalTime,
    ProposalId, Result, StateDigest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Service lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Genesis done, not yet open to users
    Opening,
    /// Open to users
    Open,
    /// Restarted from a ledger whose secret is lost
    WaitingForRecovery,
    /// Recovery accepted; collecting shares
    WaitingForRecoveryShares,
}

/// Service-wide governance state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Lifecycle status
    pub status: ServiceStatus,
    /// Shares needed to reconstruct the ledger secret
    pub recovery_threshold: usize,
    /// Incremented each time a recovery is accepted
    pub recovery_epoch: u64,
    /// Incremented each time recovery shares are re-issued
    pub shares_epoch: u64,
    /// Incremented by each rekey
    pub ledger_secret_epoch: u64,
    /// Installed application bundle
    pub app: Option<Value>,
    /// Accepted code digests
    pub code_ids: BTreeSet<String>,
    /// Registered users and their data
    pub users: BTreeMap<KeyRef, Value>,
}

impl ServiceState {
    fn new(status: ServiceStatus, recovery_threshold: usize) -> Self {
        Self {
            status,
            recovery_threshold,
            recovery_epoch: 0,
            shares_epoch: 0,
            ledger_secret_epoch: 0,
            app: None,
            code_ids: BTreeSet::new(),
            users: BTreeMap::new(),
        }
    }

    /// Whether a recovery is waiting or in progress
    pub fn is_recovering(&self) -> bool {
        matches!(
            self.status,
            ServiceStatus::WaitingForRecovery | ServiceStatus::WaitingForRecoveryShares
        )
    }
}

/// Proof that a specific accepted proposal is being enacted.
///
/// Only `Governance` can construct one; operations that must be driven by a
/// proposal, such as retiring a member, require it.
#[derive(Debug, Clone, PartialEq)]
pub struct Enactment {
    proposal: ProposalId,
    action: ProposalAction,
}

impl Enactment {
    pub(crate) fn new(proposal: ProposalId, action: ProposalAction) -> Self {
        Self { proposal, action }
    }

    /// Proposal being enacted
    pub fn proposal(&self) -> ProposalId {
        self.proposal
    }

    /// Action being enacted
    pub fn action(&self) -> &ProposalAction {
        &self.action
    }
}

/// Permission to start a recovery epoch, produced only by enacting an
/// accepted `AcceptRecovery` proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryGrant {
    proposal: ProposalId,
    epoch: u64,
    threshold: usize,
}

impl RecoveryGrant {
    /// Proposal that accepted the recovery
    pub fn proposal(&self) -> ProposalId {
        self.proposal
    }

    /// Recovery epoch this grant opens
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Shares required in this epoch
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Result of an operation that may have moved a proposal
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalUpdate {
    /// Proposal progress after the operation
    pub summary: ProposalSummary,
    /// Set when the operation enacted an `AcceptRecovery` proposal
    pub recovery: Option<RecoveryGrant>,
}

/// Owner of all governance state
#[derive(Debug, Clone)]
pub struct Governance {
    config: GovernanceConfig,
    directory: MemberDirectory,
    registry: ProposalRegistry,
    nodes: NodeTable,
    service: ServiceState,
}

impl Governance {
    /// Start a new service whose founders are immediately Active
    pub fn genesis(
        config: &ConsortiumConfig,
        founders: Vec<MemberInfo>,
    ) -> Result<(Self, Vec<MemberId>)> {
        let threshold = config.recovery.default_threshold;
        Self::bootstrap(config, founders, ServiceStatus::Opening, threshold)
    }

    /// Restart from a ledger whose secret is lost.
    ///
    /// `members` are the Active members recorded in the ledger and
    /// `recovery_threshold` the threshold in force when it was written.
    pub fn recovering(
        config: &ConsortiumConfig,
        members: Vec<MemberInfo>,
        recovery_threshold: usize,
    ) -> Result<(Self, Vec<MemberId>)> {
        Self::bootstrap(
            config,
            members,
            ServiceStatus::WaitingForRecovery,
            recovery_threshold,
        )
    }

    fn bootstrap(
        config: &ConsortiumConfig,
        members: Vec<MemberInfo>,
        status: ServiceStatus,
        recovery_threshold: usize,
    ) -> Result<(Self, Vec<MemberId>)> {
        if members.is_empty() {
            return Err(ConsortiumError::invalid("at least one member is required"));
        }
        if recovery_threshold == 0 || recovery_threshold > members.len() {
            return Err(ConsortiumError::invalid(format!(
                "recovery threshold {recovery_threshold} must be between 1 and {}",
                members.len()
            )));
        }

        let mut directory = MemberDirectory::new();
        let ids = members
            .into_iter()
            .map(|info| directory.register_founder(info))
            .collect::<Result<Vec<_>>>()?;

        let governance = Self {
            config: config.governance.clone(),
            directory,
            registry: ProposalRegistry::new(),
            nodes: NodeTable::new(),
            service: ServiceState::new(status, recovery_threshold),
        };
        info!(members = ids.len(), ?status, recovery_threshold, "governance initialised");
        Ok((governance, ids))
    }

    /// Member directory
    pub fn directory(&self) -> &MemberDirectory {
        &self.directory
    }

    /// Proposal registry
    pub fn registry(&self) -> &ProposalRegistry {
        &self.registry
    }

    /// Node table
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Service state
    pub fn service(&self) -> &ServiceState {
        &self.service
    }

    /// Current root digest
    pub fn root_digest(&self) -> StateDigest {
        self.directory.root_digest()
    }

    /// Snapshot of the Active members
    pub fn active_members(&self) -> ActiveSet {
        self.directory.active_members()
    }

    /// Look up a member
    pub fn member(&self, id: &MemberId) -> Result<&Member> {
        self.directory.member(id)
    }

    /// Progress of a proposal against the current Active set
    pub fn proposal_summary(&self, id: &ProposalId) -> Result<ProposalSummary> {
        self.registry.summary(id, &self.active_members())
    }

    /// Record a joining node as `Pending`
    pub fn add_node(&mut self, node: NodeId) -> Result<()> {
        self.nodes.add_pending(node)?;
        self.directory
            .advance_root(format!("node-joined:{node}").as_bytes());
        Ok(())
    }

    /// Submit a proposal; enacts immediately if it already has quorum
    pub fn submit_proposal(
        &mut self,
        proposer: MemberId,
        action: ProposalAction,
        now: PhysicalTime,
    ) -> Result<ProposalUpdate> {
        let active = self.active_members();
        let (id, tally) = self.registry.submit(
            proposer,
            action,
            &active,
            now,
            self.config.proposer_votes_on_submit,
        )?;
        self.directory
            .advance_root(format!("proposal-submitted:{id}:{proposer}").as_bytes());
        self.resolve(id, tally)
    }

    /// Record a ballot; enacts if it completes the quorum
    pub fn vote(
        &mut self,
        id: ProposalId,
        member: MemberId,
        ballot: Ballot,
        signed: bool,
    ) -> Result<ProposalUpdate> {
        let active = self.active_members();
        let tally = self.registry.vote(id, member, ballot, signed, &active)?;
        self.directory
            .advance_root(format!("vote:{id}:{member}:{ballot:?}").as_bytes());
        self.resolve(id, tally)
    }

    /// Withdraw an open proposal
    pub fn withdraw(&mut self, id: ProposalId, member: MemberId) -> Result<ProposalSummary> {
        self.registry.withdraw(id, member)?;
        self.directory
            .advance_root(format!("proposal-withdrawn:{id}").as_bytes());
        self.proposal_summary(&id)
    }

    /// Re-evaluate an open proposal against the current Active set
    pub fn complete(&mut self, id: ProposalId) -> Result<ProposalUpdate> {
        let active = self.active_members();
        let tally = self.registry.complete(id, &active)?;
        self.resolve(id, tally)
    }

    /// Digest `member` must acknowledge to activate
    pub fn update_ack_state_digest(&mut self, member: MemberId) -> Result<StateDigest> {
        self.directory.update_ack_state_digest(member)
    }

    /// Acknowledge `digest` on behalf of `member`
    pub fn activate_member(&mut self, member: MemberId, digest: StateDigest) -> Result<()> {
        self.directory.activate(member, digest)
    }

    /// Mark the recovery of `epoch` as complete and open the service
    pub fn recovery_completed(&mut self, epoch: u64) -> Result<()> {
        self.check_recovery_epoch(epoch)?;
        self.service.status = ServiceStatus::Open;
        self.service.shares_epoch += 1;
        self.directory
            .advance_root(format!("recovery-completed:{epoch}").as_bytes());
        info!(epoch, "service recovered and open");
        Ok(())
    }

    /// Return to `WaitingForRecovery` after the recovery of `epoch` failed
    pub fn recovery_failed(&mut self, epoch: u64) -> Result<()> {
        self.check_recovery_epoch(epoch)?;
        self.service.status = ServiceStatus::WaitingForRecovery;
        self.directory
            .advance_root(format!("recovery-failed:{epoch}").as_bytes());
        Ok(())
    }

    fn check_recovery_epoch(&self, epoch: u64) -> Result<()> {
        if self.service.status != ServiceStatus::WaitingForRecoveryShares {
            return Err(ConsortiumError::state_conflict(format!(
                "service is {:?}, not collecting recovery shares",
                self.service.status
            )));
        }
        if self.service.recovery_epoch != epoch {
            return Err(ConsortiumError::state_conflict(format!(
                "recovery epoch {epoch} is not current ({})",
                self.service.recovery_epoch
            )));
        }
        Ok(())
    }

    fn resolve(&mut self, id: ProposalId, tally: Tally) -> Result<ProposalUpdate> {
        let recovery = match tally {
            Tally::Passed => {
                let outcome = self.enact(id);
                let grant = outcome.as_ref().ok().cloned().flatten();
                self.registry
                    .finalize(id, outcome.map(|_| ()).map_err(|e| e.to_string()));
                grant
            }
            Tally::Rejected | Tally::Open { .. } => None,
        };

        let summary = self.proposal_summary(&id)?;
        if summary.state != ProposalState::Open {
            self.directory
                .advance_root(format!("proposal-{}:{id}", summary.state).as_bytes());
        }
        Ok(ProposalUpdate { summary, recovery })
    }

    /// Apply a passed proposal. Every arm checks before it mutates.
    fn enact(&mut self, id: ProposalId) -> Result<Option<RecoveryGrant>> {
        let action = self.registry.proposal(&id)?.action.clone();
        let enactment = Enactment::new(id, action.clone());
        debug!(proposal_id = %id, action = %action, "enacting proposal");

        match action {
            ProposalAction::AddMember {
                public_key,
                encryption_key,
                member_data,
            } => {
                self.directory.register(MemberInfo {
                    public_key,
                    encryption_key,
                    member_data,
                })?;
            }
            ProposalAction::RetireMember { member } => {
                let record = self.directory.member(&member)?;
                if record.status == MemberStatus::Active {
                    let remaining = self.active_members().len() - 1;
                    if remaining == 0 {
                        return Err(ConsortiumError::state_conflict(
                            "cannot retire the last active member",
                        ));
                    }
                    if remaining < self.service.recovery_threshold {
                        return Err(ConsortiumError::state_conflict(format!(
                            "retiring {member} leaves {remaining} active members, below recovery threshold {}",
                            self.service.recovery_threshold
                        )));
                    }
                }
                self.directory.retire(member, &enactment)?;
                self.registry.drop_proposals_by(member);
            }
            ProposalAction::SetMemberData {
                member,
                member_data,
            } => {
                self.directory.set_member_data(member, member_data)?;
            }
            ProposalAction::AddUser {
                user_key,
                user_data,
            } => {
                if self.service.users.contains_key(&user_key) {
                    return Err(ConsortiumError::invalid(format!(
                        "user {user_key} already exists"
                    )));
                }
                self.service.users.insert(user_key, user_data);
            }
            ProposalAction::TrustNode { node } => {
                self.nodes.check_trust(&node)?;
                self.nodes.set(node, NodeStatus::Trusted);
            }
            ProposalAction::RetireNode { node } => {
                self.nodes.check_retire(&node)?;
                self.nodes.set(node, NodeStatus::Retired);
            }
            ProposalAction::NewCode { code_digest } => {
                if !self.service.code_ids.insert(code_digest.to_lowercase()) {
                    return Err(ConsortiumError::invalid(format!(
                        "code {code_digest} is already accepted"
                    )));
                }
            }
            ProposalAction::SetRecoveryThreshold { threshold } => {
                self.check_not_recovering("change the recovery threshold")?;
                let active = self.active_members().len();
                if threshold > active {
                    return Err(ConsortiumError::invalid(format!(
                        "recovery threshold {threshold} exceeds {active} active members"
                    )));
                }
                self.service.recovery_threshold = threshold;
                self.service.shares_epoch += 1;
            }
            ProposalAction::UpdateRecoveryShares => {
                self.check_not_recovering("re-issue recovery shares")?;
                self.service.shares_epoch += 1;
            }
            ProposalAction::Rekey => {
                self.check_not_recovering("rekey")?;
                self.service.ledger_secret_epoch += 1;
                self.service.shares_epoch += 1;
            }
            ProposalAction::SetApp { bundle } => {
                self.service.app = Some(bundle);
            }
            ProposalAction::OpenNetwork => {
                if self.service.status != ServiceStatus::Opening {
                    return Err(ConsortiumError::state_conflict(format!(
                        "service is {:?}, not opening",
                        self.service.status
                    )));
                }
                self.service.status = ServiceStatus::Open;
            }
            ProposalAction::AcceptRecovery => {
                if self.service.status != ServiceStatus::WaitingForRecovery {
                    return Err(ConsortiumError::state_conflict(format!(
                        "service is {:?}, not waiting for recovery",
                        self.service.status
                    )));
                }
                self.service.status = ServiceStatus::WaitingForRecoveryShares;
                self.service.recovery_epoch += 1;
                let grant = RecoveryGrant {
                    proposal: id,
                    epoch: self.service.recovery_epoch,
                    threshold: self.service.recovery_threshold,
                };
                info!(proposal_id = %id, epoch = grant.epoch, threshold = grant.threshold, "recovery accepted");
                return Ok(Some(grant));
            }
        }
        Ok(None)
    }

    fn check_not_recovering(&self, what: &str) -> Result<()> {
        if self.service.is_recovering() {
            return Err(ConsortiumError::state_conflict(format!(
                "cannot {what} while the service is recovering"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn founders(n: u64) -> Vec<MemberInfo> {
        (0..n)
            .map(|i| MemberInfo::new(format!("pk{i}"), format!("enc{i}")))
            .collect()
    }

    fn genesis(n: u64, threshold: usize) -> Governance {
        let mut config = ConsortiumConfig::default();
        config.recovery.default_threshold = threshold;
        Governance::genesis(&config, founders(n)).unwrap().0
    }

    fn now() -> PhysicalTime {
        PhysicalTime::from_ms(1)
    }

    /// Submit from member 0 and approve from the following members until
    /// the proposal leaves `Open`.
    fn pass(gov: &mut Governance, action: ProposalAction) -> ProposalUpdate {
        let mut update = gov.submit_proposal(MemberId(0), action, now()).unwrap();
        let mut next = 1;
        while update.summary.state == ProposalState::Open {
            update = gov
                .vote(update.summary.proposal_id, MemberId(next), Ballot::Approve, true)
                .unwrap();
            next += 1;
        }
        update
    }

    #[test]
    fn test_genesis_validation() {
        let config = ConsortiumConfig::default();
        assert_matches!(
            Governance::genesis(&config, vec![]),
            Err(ConsortiumError::Invalid { .. })
        );
        let mut config = ConsortiumConfig::default();
        config.recovery.default_threshold = 4;
        assert_matches!(
            Governance::genesis(&config, founders(3)),
            Err(ConsortiumError::Invalid { .. })
        );
    }

    #[test]
    fn test_open_network_accepted() {
        let mut gov = genesis(3, 2);
        let update = pass(&mut gov, ProposalAction::OpenNetwork);
        assert_eq!(update.summary.state, ProposalState::Accepted);
        assert_eq!(gov.service().status, ServiceStatus::Open);

        // A second open fails enactment and leaves state untouched.
        let update = pass(&mut gov, ProposalAction::OpenNetwork);
        assert_eq!(update.summary.state, ProposalState::Failed);
        assert!(update.summary.failure_reason.is_some());
    }

    #[test]
    fn test_add_member_then_ack() {
        let mut gov = genesis(3, 1);
        pass(
            &mut gov,
            ProposalAction::AddMember {
                public_key: KeyRef::new("pk-new"),
                encryption_key: KeyRef::new("enc-new"),
                member_data: Value::Null,
            },
        );
        let new_member = MemberId(3);
        assert_eq!(gov.member(&new_member).unwrap().status, MemberStatus::Accepted);

        let digest = gov.update_ack_state_digest(new_member).unwrap();
        gov.activate_member(new_member, digest).unwrap();
        assert_eq!(gov.active_members().len(), 4);
    }

    #[test]
    fn test_mutation_makes_ack_stale() {
        let mut gov = genesis(3, 1);
        pass(
            &mut gov,
            ProposalAction::AddMember {
                public_key: KeyRef::new("pk-new"),
                encryption_key: KeyRef::new("enc-new"),
                member_data: Value::Null,
            },
        );
        let digest = gov.update_ack_state_digest(MemberId(3)).unwrap();
        gov.submit_proposal(MemberId(0), ProposalAction::Rekey, now())
            .unwrap();
        assert_matches!(
            gov.activate_member(MemberId(3), digest),
            Err(ConsortiumError::StaleAck { .. })
        );
    }

    #[test]
    fn test_retire_member_drops_open_proposals() {
        let mut gov = genesis(4, 1);
        let open = gov
            .submit_proposal(MemberId(3), ProposalAction::Rekey, now())
            .unwrap();
        let update = pass(&mut gov, ProposalAction::RetireMember { member: MemberId(3) });
        assert_eq!(update.summary.state, ProposalState::Accepted);
        assert_eq!(gov.member(&MemberId(3)).unwrap().status, MemberStatus::Retired);
        assert_eq!(
            gov.registry()
                .proposal(&open.summary.proposal_id)
                .unwrap()
                .state,
            ProposalState::Dropped
        );
    }

    #[test]
    fn test_retire_below_recovery_threshold_fails() {
        let mut gov = genesis(3, 3);
        let update = pass(&mut gov, ProposalAction::RetireMember { member: MemberId(2) });
        assert_eq!(update.summary.state, ProposalState::Failed);
        assert!(gov.member(&MemberId(2)).unwrap().is_active());
    }

    #[test]
    fn test_threshold_larger_than_active_set_fails() {
        let mut gov = genesis(3, 1);
        let update = pass(&mut gov, ProposalAction::SetRecoveryThreshold { threshold: 4 });
        assert_eq!(update.summary.state, ProposalState::Failed);
        assert_eq!(gov.service().recovery_threshold, 1);

        let update = pass(&mut gov, ProposalAction::SetRecoveryThreshold { threshold: 2 });
        assert_eq!(update.summary.state, ProposalState::Accepted);
        assert_eq!(gov.service().recovery_threshold, 2);
        assert_eq!(gov.service().shares_epoch, 1);
    }

    #[test]
    fn test_trust_unknown_or_retired_node_fails() {
        let mut gov = genesis(1, 1);
        let update = pass(&mut gov, ProposalAction::TrustNode { node: NodeId(5) });
        assert_eq!(update.summary.state, ProposalState::Failed);

        gov.add_node(NodeId(5)).unwrap();
        pass(&mut gov, ProposalAction::TrustNode { node: NodeId(5) });
        assert_eq!(gov.nodes().status(&NodeId(5)), Some(NodeStatus::Trusted));
        pass(&mut gov, ProposalAction::RetireNode { node: NodeId(5) });
        let update = pass(&mut gov, ProposalAction::TrustNode { node: NodeId(5) });
        assert_eq!(update.summary.state, ProposalState::Failed);
    }

    #[test]
    fn test_accept_recovery_requires_recovering_service() {
        let mut gov = genesis(3, 2);
        let update = pass(&mut gov, ProposalAction::AcceptRecovery);
        assert_eq!(update.summary.state, ProposalState::Failed);
        assert!(update.recovery.is_none());

        let (mut gov, _) = Governance::recovering(
            &ConsortiumConfig::default(),
            founders(3),
            2,
        )
        .unwrap();
        let update = pass(&mut gov, ProposalAction::AcceptRecovery);
        let grant = update.recovery.unwrap();
        assert_eq!(grant.epoch(), 1);
        assert_eq!(grant.threshold(), 2);
        assert_eq!(gov.service().status, ServiceStatus::WaitingForRecoveryShares);

        let update = pass(&mut gov, ProposalAction::SetRecoveryThreshold { threshold: 1 });
        assert_eq!(update.summary.state, ProposalState::Failed);

        gov.recovery_completed(1).unwrap();
        assert_eq!(gov.service().status, ServiceStatus::Open);
    }

    #[test]
    fn test_proposer_vote_disabled() {
        let mut config = ConsortiumConfig::default();
        config.governance.proposer_votes_on_submit = false;
        let (mut gov, _) = Governance::genesis(&config, founders(1)).unwrap();
        let update = gov
            .submit_proposal(MemberId(0), ProposalAction::Rekey, now())
            .unwrap();
        assert_eq!(update.summary.state, ProposalState::Open);
        assert_eq!(update.summary.approvals, 0);
        let update = gov
            .vote(update.summary.proposal_id, MemberId(0), Ballot::Approve, true)
            .unwrap();
        assert_eq!(update.summary.state, ProposalState::Accepted);
    }
}
