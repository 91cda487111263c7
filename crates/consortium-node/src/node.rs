//! Consortium node
//!
//! One node owns the governance state and the recovery coordinator. The
//! governance container sits behind a synchronous lock that is never held
//! across an await; the coordinator sits behind an async lock held for the
//! duration of share decryption and combination so share submissions are
//! linearized. Every state change bumps a counter on a watch channel that
//! local waits subscribe to.

use consortium_core::{
    Config, ConsortiumConfig, ConsortiumError, Deadline, KeyRef, MemberId, NodeEffects, NodeId,
    ProposalId, Result, StateDigest,
};
use consortium_governance::{
    Ballot, Governance, Member, MemberInfo, NodeStatus, ProposalAction, ProposalState,
    ProposalSummary, ProposalUpdate, RecoveryGrant, ServiceState,
};
use consortium_recovery::{
    EncryptedShare, RecoveryCoordinator, RecoveryPhase, RecoveryStatus, ShareOutcome,
};
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{info, warn};

/// Ledger table holding archived network keys
pub const NETWORK_KEYS_TABLE: &str = "network_keys";
/// Key of the network key in force before the disaster
pub const PREVIOUS_NETWORK_KEY: &str = "previous";

/// Node-side owner of governance and recovery state
pub struct ConsortiumNode<E> {
    effects: E,
    config: ConsortiumConfig,
    governance: Mutex<Governance>,
    recovery: AsyncMutex<RecoveryCoordinator>,
    changes: watch::Sender<u64>,
}

impl<E: NodeEffects> ConsortiumNode<E> {
    /// Start a new service whose founders are immediately Active
    pub fn genesis(
        effects: E,
        config: ConsortiumConfig,
        founders: Vec<MemberInfo>,
    ) -> Result<(Self, Vec<MemberId>)> {
        config.validate()?;
        let (governance, ids) = Governance::genesis(&config, founders)?;
        Ok((Self::with_governance(effects, config, governance), ids))
    }

    /// Restart from a ledger whose secret is lost
    pub fn start_in_recovery(
        effects: E,
        config: ConsortiumConfig,
        members: Vec<MemberInfo>,
        recovery_threshold: usize,
    ) -> Result<(Self, Vec<MemberId>)> {
        config.validate()?;
        let (governance, ids) = Governance::recovering(&config, members, recovery_threshold)?;
        Ok((Self::with_governance(effects, config, governance), ids))
    }

    fn with_governance(effects: E, config: ConsortiumConfig, governance: Governance) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            effects,
            config,
            governance: Mutex::new(governance),
            recovery: AsyncMutex::new(RecoveryCoordinator::new()),
            changes,
        }
    }

    /// Node configuration
    pub fn config(&self) -> &ConsortiumConfig {
        &self.config
    }

    /// Node effects
    pub fn effects(&self) -> &E {
        &self.effects
    }

    /// Run `f` against the governance state
    pub fn read<R>(&self, f: impl FnOnce(&Governance) -> R) -> R {
        f(&self.governance.lock())
    }

    /// Receiver that changes whenever node state changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Record a joining node as `Pending`
    pub fn add_node(&self, node: NodeId) -> Result<()> {
        self.governance.lock().add_node(node)?;
        self.notify();
        Ok(())
    }

    /// Submit a proposal from `caller`
    pub async fn submit_proposal(
        &self,
        caller: MemberId,
        action: ProposalAction,
    ) -> Result<ProposalSummary> {
        let now = self.effects.physical_time().await?;
        let update = self.governance.lock().submit_proposal(caller, action, now)?;
        self.after_update(update).await
    }

    /// Cast `caller`'s ballot
    pub async fn vote(
        &self,
        caller: MemberId,
        proposal: ProposalId,
        ballot: Ballot,
        signed: bool,
    ) -> Result<ProposalSummary> {
        let update = self
            .governance
            .lock()
            .vote(proposal, caller, ballot, signed)?;
        self.after_update(update).await
    }

    /// Withdraw `caller`'s open proposal
    pub fn withdraw(&self, caller: MemberId, proposal: ProposalId) -> Result<ProposalSummary> {
        let summary = self.governance.lock().withdraw(proposal, caller)?;
        self.notify();
        Ok(summary)
    }

    /// Re-evaluate an open proposal against the current Active set
    pub async fn complete_proposal(&self, proposal: ProposalId) -> Result<ProposalSummary> {
        let update = self.governance.lock().complete(proposal)?;
        self.after_update(update).await
    }

    /// Propose retiring `member`
    pub async fn retire_member(
        &self,
        caller: MemberId,
        member: MemberId,
    ) -> Result<ProposalSummary> {
        self.submit_proposal(caller, ProposalAction::RetireMember { member })
            .await
    }

    /// Propose accepting the recovery
    pub async fn accept_recovery(&self, caller: MemberId) -> Result<ProposalSummary> {
        self.submit_proposal(caller, ProposalAction::AcceptRecovery)
            .await
    }

    /// Digest `caller` must acknowledge
    pub fn update_ack_state_digest(&self, caller: MemberId) -> Result<StateDigest> {
        self.governance.lock().update_ack_state_digest(caller)
    }

    /// Acknowledge `digest`, activating `caller`
    pub fn activate_member(&self, caller: MemberId, digest: StateDigest) -> Result<()> {
        self.governance.lock().activate_member(caller, digest)?;
        self.notify();
        Ok(())
    }

    /// Submit `caller`'s recovery share
    pub async fn submit_share(
        &self,
        caller: MemberId,
        share: EncryptedShare,
    ) -> Result<ShareOutcome> {
        let member = self.governance.lock().member(&caller)?.clone();

        let mut coordinator = self.recovery.lock().await;
        let epoch = coordinator.epoch();
        let was_failed = coordinator.phase() == RecoveryPhase::Failed;
        let result = coordinator
            .submit_share(&self.effects, &member, &share)
            .await;
        let phase = coordinator.phase();
        drop(coordinator);

        match &result {
            Ok(ShareOutcome::Recovered { epoch }) => {
                self.governance.lock().recovery_completed(*epoch)?;
                self.notify();
            }
            Ok(ShareOutcome::Pending { .. }) => self.notify(),
            Err(e) if !was_failed && phase == RecoveryPhase::Failed => {
                warn!(epoch, error = %e, "recovery epoch failed");
                self.governance.lock().recovery_failed(epoch)?;
                self.notify();
            }
            Err(_) => {}
        }
        result
    }

    /// Coordinator status
    pub async fn recovery_status(&self) -> RecoveryStatus {
        self.recovery.lock().await.status()
    }

    /// Progress of a proposal
    pub fn proposal(&self, proposal: ProposalId) -> Result<ProposalSummary> {
        self.governance.lock().proposal_summary(&proposal)
    }

    /// Member record
    pub fn member(&self, member: MemberId) -> Result<Member> {
        self.governance.lock().member(&member).cloned()
    }

    /// Status of a node
    pub fn node_status(&self, node: NodeId) -> Result<NodeStatus> {
        self.governance
            .lock()
            .nodes()
            .status(&node)
            .ok_or_else(|| ConsortiumError::not_found(format!("{node} does not exist")))
    }

    /// Service state
    pub fn service(&self) -> ServiceState {
        self.governance.lock().service().clone()
    }

    /// Wait until `proposal` reaches `target`.
    ///
    /// Fails with `StateConflict` if it ends in a different terminal state.
    pub async fn wait_for_proposal_state(
        &self,
        proposal: ProposalId,
        target: ProposalState,
        deadline: Deadline,
    ) -> Result<ProposalSummary> {
        let what = format!("{proposal} to become {target}");
        self.wait_for(deadline, &what, move || async move {
            let summary = self.proposal(proposal)?;
            if summary.state == target {
                return Ok(Some(summary));
            }
            if summary.state.is_terminal() {
                return Err(ConsortiumError::state_conflict(format!(
                    "{proposal} ended {}, not {target}",
                    summary.state
                )));
            }
            Ok(None)
        })
        .await
    }

    /// Wait until the current recovery epoch completes; returns the epoch
    pub async fn wait_for_recovery(&self, deadline: Deadline) -> Result<u64> {
        self.wait_for(deadline, "recovery", move || async move {
            let status = self.recovery_status().await;
            match status.phase {
                RecoveryPhase::Recovered => Ok(Some(status.epoch)),
                RecoveryPhase::Failed => Err(ConsortiumError::state_conflict(format!(
                    "recovery epoch {} failed: {}",
                    status.epoch,
                    status.failure.unwrap_or_default()
                ))),
                _ => Ok(None),
            }
        })
        .await
    }

    /// Re-check `probe` after every state change until it yields a value or
    /// the deadline passes
    async fn wait_for<T, F, Fut>(&self, deadline: Deadline, what: &str, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Option<T>>>,
    {
        let mut changes = self.subscribe();
        let started = self.effects.physical_time().await?;
        loop {
            if let Some(value) = probe().await? {
                return Ok(value);
            }
            let waited = self.effects.physical_time().await?.since(started);
            if waited >= deadline.timeout_ms() {
                return Err(ConsortiumError::timeout(what, waited));
            }
            let remaining = deadline.timeout_ms() - waited;
            tokio::select! {
                changed = changes.changed() => {
                    changed.map_err(|_| ConsortiumError::state_conflict("node shut down"))?;
                }
                slept = self.effects.sleep_ms(remaining) => slept?,
            }
        }
    }

    async fn after_update(&self, update: ProposalUpdate) -> Result<ProposalSummary> {
        if let Some(grant) = update.recovery {
            self.start_recovery(grant).await?;
        }
        self.notify();
        Ok(update.summary)
    }

    /// Start the coordinator for an accepted recovery and bind the archived
    /// network key. If the key cannot be read the service goes back to
    /// waiting for recovery.
    async fn start_recovery(&self, grant: RecoveryGrant) -> Result<()> {
        let epoch = grant.epoch();
        let archived = match self.read_archived_key().await {
            Ok(key) => key,
            Err(e) => {
                warn!(epoch, error = %e, "archived network key unavailable");
                self.governance.lock().recovery_failed(epoch)?;
                self.notify();
                return Err(e);
            }
        };

        let mut coordinator = self.recovery.lock().await;
        coordinator.accept_recovery(grant)?;
        coordinator.arm(archived)?;
        info!(epoch, "recovery started");
        Ok(())
    }

    async fn read_archived_key(&self) -> Result<KeyRef> {
        let value = self
            .effects
            .read(NETWORK_KEYS_TABLE, PREVIOUS_NETWORK_KEY)
            .await?
            .ok_or_else(|| ConsortiumError::not_found("archived network key"))?;
        let key = value
            .as_str()
            .ok_or_else(|| ConsortiumError::invalid("archived network key is not a string"))?;
        Ok(KeyRef::new(key))
    }
}
