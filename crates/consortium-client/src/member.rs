//! One member's client over the transport
//!
//! Signs governance requests, decodes typed errors from error responses, and
//! keeps its own commit status tracker so every status it is told about is
//! checked against everything it was told before.

use async_trait::async_trait;
use consortium_commit::{
    reconstruct_history, wait_for_commit, CommitStatusTracker, TxStatus, TxStatusSource,
};
use consortium_core::{
    poll_until, BackoffPolicy, ClientEffects, ConsortiumConfig, ConsortiumError, Deadline, KeyRef,
    MemberId, PollOutcome, ProposalId, Result, StateDigest, TxId,
};
use consortium_governance::{
    Ballot, Member, ProposalAction, ProposalState, ProposalSummary, ServiceState,
};
use consortium_node::{
    ops, AckParams, MemberParams, ProposalParams, ProposeParams, ShareParams, VoteParams,
};
use consortium_recovery::{EncryptedShare, RecoveryPhase, RecoveryStatus, ShareOutcome};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Ledger table holding each member's encrypted recovery share
pub const RECOVERY_SHARES_TABLE: &str = "recovery_shares";

/// Transport operation reporting a transaction's commit status
pub const TX_STATUS_OP: &str = "tx";

/// Outcome of an idempotent share submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareSubmission {
    /// The share was counted now
    Counted(ShareOutcome),
    /// The share had already been counted in this epoch
    AlreadyCounted,
}

#[derive(Debug, Serialize, Deserialize)]
struct TxStatusResponse {
    status: TxStatus,
}

/// Client acting for a single member
pub struct MemberClient<E> {
    effects: E,
    member: MemberId,
    signing_key: KeyRef,
    config: ConsortiumConfig,
    tracker: Mutex<CommitStatusTracker>,
}

impl<E: ClientEffects> MemberClient<E> {
    /// Client for `member`, signing with `signing_key`
    pub fn new(effects: E, member: MemberId, signing_key: KeyRef, config: ConsortiumConfig) -> Self {
        Self {
            effects,
            member,
            signing_key,
            config,
            tracker: Mutex::new(CommitStatusTracker::new()),
        }
    }

    /// Member this client acts for
    pub fn member_id(&self) -> MemberId {
        self.member
    }

    /// Client-side commit status tracker
    pub fn tracker(&self) -> &Mutex<CommitStatusTracker> {
        &self.tracker
    }

    /// Deadline from configuration
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after_ms(self.config.wait.default_timeout_ms)
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from(&self.config.wait)
    }

    async fn call(&self, op: &str, mut params: Value, signed: bool) -> Result<Value> {
        if signed {
            let payload = serde_json::to_vec(&json!({ "op": op, "params": &params }))?;
            let signature = self.effects.sign(&self.signing_key, &payload).await?;
            if let Value::Object(map) = &mut params {
                map.insert("signature".to_string(), Value::String(hex::encode(signature)));
            }
        }

        let response = self.effects.request(op, params, signed).await?;
        if response.is_success() {
            return Ok(response.body.unwrap_or(Value::Null));
        }

        let error = response.error.unwrap_or(Value::Null);
        let decoded = serde_json::from_value::<ConsortiumError>(error.clone()).unwrap_or_else(|_| {
            ConsortiumError::Remote {
                status: response.status,
                message: error.to_string(),
            }
        });
        debug!(member = %self.member, op, code = decoded.code(), "request failed");
        Err(decoded)
    }

    async fn call_as<T: DeserializeOwned>(&self, op: &str, params: Value, signed: bool) -> Result<T> {
        let body = self.call(op, params, signed).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Submit a proposal
    pub async fn propose(&self, action: ProposalAction) -> Result<ProposalSummary> {
        let params = serde_json::to_value(ProposeParams { action })?;
        self.call_as(ops::PROPOSE, params, true).await
    }

    /// Vote on a proposal
    pub async fn vote(&self, proposal_id: ProposalId, ballot: Ballot) -> Result<ProposalSummary> {
        let params = serde_json::to_value(VoteParams {
            proposal_id,
            ballot,
        })?;
        self.call_as(ops::VOTE, params, true).await
    }

    /// Withdraw one of this member's proposals
    pub async fn withdraw(&self, proposal_id: ProposalId) -> Result<ProposalSummary> {
        let params = serde_json::to_value(ProposalParams { proposal_id })?;
        self.call_as(ops::WITHDRAW, params, true).await
    }

    /// Ask the node to re-evaluate a proposal
    pub async fn complete(&self, proposal_id: ProposalId) -> Result<ProposalSummary> {
        let params = serde_json::to_value(ProposalParams { proposal_id })?;
        self.call_as(ops::COMPLETE, params, true).await
    }

    /// Fetch the current digest and acknowledge it
    pub async fn ack(&self) -> Result<StateDigest> {
        let AckParams { state_digest } = self
            .call_as(ops::UPDATE_ACK_STATE_DIGEST, json!({}), true)
            .await?;
        let params = serde_json::to_value(AckParams { state_digest })?;
        self.call(ops::ACK, params, true).await?;
        info!(member = %self.member, "state acknowledged");
        Ok(state_digest)
    }

    /// Propose retiring `member`
    pub async fn retire_member(&self, member: MemberId) -> Result<ProposalSummary> {
        self.propose(ProposalAction::RetireMember { member }).await
    }

    /// Propose accepting the recovery
    pub async fn accept_recovery(&self) -> Result<ProposalSummary> {
        self.propose(ProposalAction::AcceptRecovery).await
    }

    /// Read this member's encrypted share from the ledger
    pub async fn fetch_recovery_share(&self) -> Result<EncryptedShare> {
        let key = self.member.value().to_string();
        let value = self
            .effects
            .read(RECOVERY_SHARES_TABLE, &key)
            .await?
            .ok_or_else(|| {
                ConsortiumError::not_found(format!("no recovery share for {}", self.member))
            })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch and submit this member's share
    pub async fn submit_recovery_share(&self) -> Result<ShareOutcome> {
        let share = self.fetch_recovery_share().await?;
        let params = serde_json::to_value(ShareParams { share })?;
        self.call_as(ops::SUBMIT_RECOVERY_SHARE, params, true).await
    }

    /// Submit this member's share, treating an already-counted share as
    /// success. Safe to call again after a transport failure or a node
    /// restart.
    pub async fn submit_recovery_share_idempotent(&self) -> Result<ShareSubmission> {
        match self.submit_recovery_share().await {
            Ok(outcome) => Ok(ShareSubmission::Counted(outcome)),
            Err(ConsortiumError::DuplicateShare { .. }) => Ok(ShareSubmission::AlreadyCounted),
            Err(e) => Err(e),
        }
    }

    /// Read a proposal
    pub async fn proposal(&self, proposal_id: ProposalId) -> Result<ProposalSummary> {
        let params = serde_json::to_value(ProposalParams { proposal_id })?;
        self.call_as(ops::PROPOSAL, params, false).await
    }

    /// Read a member
    pub async fn member(&self, member_id: MemberId) -> Result<Member> {
        let params = serde_json::to_value(MemberParams { member_id })?;
        self.call_as(ops::MEMBER, params, false).await
    }

    /// Read the service state
    pub async fn service(&self) -> Result<ServiceState> {
        self.call_as(ops::SERVICE, json!({}), false).await
    }

    /// Read the recovery coordinator status
    pub async fn recovery_status(&self) -> Result<RecoveryStatus> {
        self.call_as(ops::RECOVERY, json!({}), false).await
    }

    /// Query `tx` and fold the answer into the tracker
    pub async fn get_commit_status(&self, tx: TxId) -> Result<TxStatus> {
        let status = self.tx_status(tx).await?;
        self.tracker.lock().observe(tx, status)
    }

    /// Wait for `tx` to commit
    pub async fn wait_for_commit(&self, tx: TxId, deadline: Deadline) -> Result<()> {
        wait_for_commit(
            self,
            &self.effects,
            &self.tracker,
            tx,
            deadline,
            &self.backoff(),
        )
        .await
    }

    /// Wait for a proposal to reach `target`; fails if it ends elsewhere
    pub async fn wait_for_proposal_state(
        &self,
        proposal_id: ProposalId,
        target: ProposalState,
        deadline: Deadline,
    ) -> Result<ProposalSummary> {
        let what = format!("{proposal_id} to become {target}");
        poll_until(&self.effects, deadline, &self.backoff(), &what, move || async move {
            let summary = self.proposal(proposal_id).await?;
            if summary.state == target {
                Ok(PollOutcome::Ready(summary))
            } else if summary.state.is_terminal() {
                Err(ConsortiumError::state_conflict(format!(
                    "{proposal_id} ended {}, not {target}",
                    summary.state
                )))
            } else {
                Ok(PollOutcome::Pending)
            }
        })
        .await
    }

    /// Wait for the current recovery epoch to complete; returns the epoch
    pub async fn wait_for_recovery(&self, deadline: Deadline) -> Result<u64> {
        poll_until(&self.effects, deadline, &self.backoff(), "recovery", move || async move {
            let status = self.recovery_status().await?;
            match status.phase {
                RecoveryPhase::Recovered => Ok(PollOutcome::Ready(status.epoch)),
                RecoveryPhase::Failed => Err(ConsortiumError::state_conflict(format!(
                    "recovery epoch {} failed",
                    status.epoch
                ))),
                _ => Ok(PollOutcome::Pending),
            }
        })
        .await
    }

    /// Rebuild the committed history up to `commit`
    pub async fn reconstruct_history(&self, commit: TxId) -> Result<Vec<TxId>> {
        reconstruct_history(commit, self, &self.tracker).await
    }
}

#[async_trait]
impl<E: ClientEffects> TxStatusSource for MemberClient<E> {
    async fn tx_status(&self, tx: TxId) -> Result<TxStatus> {
        let response: TxStatusResponse = self
            .call_as(TX_STATUS_OP, json!({ "view": tx.view, "seqno": tx.seqno }), false)
            .await?;
        Ok(response.status)
    }
}
