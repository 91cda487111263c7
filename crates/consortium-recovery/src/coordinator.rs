//! Recovery coordinator state machine
//!
//! ```text
//! Idle ──accept_recovery──▶ RecoveryPending ──arm──▶ AwaitingShares
//!                                                        │ submit_share (threshold reached)
//!                                                        ▼
//!                        Failed ◀──combine fails── Reconstructing ──▶ Recovered
//! ```
//!
//! A failed epoch may be replaced by a new grant. The coordinator is not
//! durable: after a restart members re-submit and duplicates are refused
//! rather than double-counted.

use crate::share::{EncryptedShare, ShareOutcome};
use consortium_core::{
    ConsortiumError, CryptoEffects, DecryptedShare, KeyRef, MemberId, RecoveredSecret, Result,
};
use consortium_governance::{Member, RecoveryGrant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    /// No recovery accepted
    Idle,
    /// Recovery accepted; archived network key not yet bound
    RecoveryPending,
    /// Collecting shares
    AwaitingShares,
    /// Threshold reached; combining shares
    Reconstructing,
    /// Secret reconstructed; terminal for the epoch
    Recovered,
    /// Combination failed; a new grant may start another epoch
    Failed,
}

impl RecoveryPhase {
    /// Whether the current epoch has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Recovered | Self::Failed)
    }
}

/// Externally visible coordinator status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStatus {
    /// Current phase
    pub phase: RecoveryPhase,
    /// Current recovery epoch, zero before the first grant
    pub epoch: u64,
    /// Shares counted in this epoch
    pub submitted: usize,
    /// Shares needed in this epoch
    pub threshold: usize,
    /// Why the epoch failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Sequences share submission and secret reconstruction
#[derive(Debug)]
pub struct RecoveryCoordinator {
    phase: RecoveryPhase,
    epoch: u64,
    threshold: usize,
    archived_key: Option<KeyRef>,
    shares: BTreeMap<MemberId, DecryptedShare>,
    /// Shares counted this epoch; survives the hand-off to combination
    submitted: usize,
    secret: Option<RecoveredSecret>,
    failure: Option<String>,
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryCoordinator {
    /// Idle coordinator
    pub fn new() -> Self {
        Self {
            phase: RecoveryPhase::Idle,
            epoch: 0,
            threshold: 0,
            archived_key: None,
            shares: BTreeMap::new(),
            submitted: 0,
            secret: None,
            failure: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Snapshot for reporting
    pub fn status(&self) -> RecoveryStatus {
        RecoveryStatus {
            phase: self.phase,
            epoch: self.epoch,
            submitted: self.submitted,
            threshold: self.threshold,
            failure: self.failure.clone(),
        }
    }

    /// Reconstructed secret, once `Recovered`
    pub fn secret(&self) -> Option<&RecoveredSecret> {
        self.secret.as_ref()
    }

    /// Start the epoch opened by `grant`
    pub fn accept_recovery(&mut self, grant: RecoveryGrant) -> Result<()> {
        match self.phase {
            RecoveryPhase::Idle | RecoveryPhase::Failed => {}
            RecoveryPhase::Recovered => return Err(ConsortiumError::RecoveryAlreadyComplete),
            phase => {
                return Err(ConsortiumError::state_conflict(format!(
                    "recovery epoch {} is already {phase:?}",
                    self.epoch
                )))
            }
        }
        if grant.epoch() <= self.epoch {
            return Err(ConsortiumError::state_conflict(format!(
                "grant for epoch {} is not newer than epoch {}",
                grant.epoch(),
                self.epoch
            )));
        }

        self.phase = RecoveryPhase::RecoveryPending;
        self.epoch = grant.epoch();
        self.threshold = grant.threshold();
        self.archived_key = None;
        self.shares.clear();
        self.submitted = 0;
        self.failure = None;
        info!(
            epoch = self.epoch,
            threshold = self.threshold,
            proposal_id = %grant.proposal(),
            "recovery pending"
        );
        Ok(())
    }

    /// Bind the pre-recovery network key that encrypted the shares
    pub fn arm(&mut self, archived_network_key: KeyRef) -> Result<()> {
        if self.phase != RecoveryPhase::RecoveryPending {
            return Err(ConsortiumError::state_conflict(format!(
                "cannot arm recovery in phase {:?}",
                self.phase
            )));
        }
        if archived_network_key.is_empty() {
            return Err(ConsortiumError::invalid("archived network key is empty"));
        }
        self.archived_key = Some(archived_network_key);
        self.phase = RecoveryPhase::AwaitingShares;
        info!(epoch = self.epoch, "awaiting recovery shares");
        Ok(())
    }

    /// Decrypt and count one member's share; combine once the threshold is met
    pub async fn submit_share<C>(
        &mut self,
        crypto: &C,
        member: &Member,
        share: &EncryptedShare,
    ) -> Result<ShareOutcome>
    where
        C: CryptoEffects + ?Sized,
    {
        match self.phase {
            RecoveryPhase::AwaitingShares => {}
            RecoveryPhase::Recovered => return Err(ConsortiumError::RecoveryAlreadyComplete),
            phase => {
                return Err(ConsortiumError::state_conflict(format!(
                    "not accepting recovery shares in phase {phase:?}"
                )))
            }
        }
        if share.member_id != member.id {
            return Err(ConsortiumError::invalid(format!(
                "share for {} submitted as {}",
                share.member_id, member.id
            )));
        }
        if !member.is_active() {
            warn!(member = %member.id, "recovery share from inactive member refused");
            return Err(ConsortiumError::unauthorized(format!(
                "{} is not an active member",
                member.id
            )));
        }
        if self.shares.contains_key(&member.id) {
            return Err(ConsortiumError::DuplicateShare { member: member.id });
        }
        let archived_key = self
            .archived_key
            .as_ref()
            .ok_or_else(|| ConsortiumError::state_conflict("archived network key not bound"))?;

        let decrypted = crypto
            .decrypt_share(
                &share.ciphertext,
                &share.nonce,
                &member.encryption_key,
                archived_key,
            )
            .await?;
        self.shares.insert(member.id, decrypted);
        self.submitted = self.shares.len();
        debug!(
            member = %member.id,
            submitted = self.submitted,
            threshold = self.threshold,
            "recovery share counted"
        );

        if self.submitted < self.threshold {
            return Ok(ShareOutcome::Pending {
                submitted: self.submitted,
                threshold: self.threshold,
            });
        }

        self.phase = RecoveryPhase::Reconstructing;
        let shares: Vec<DecryptedShare> = std::mem::take(&mut self.shares).into_values().collect();
        match crypto.combine_shares(&shares, self.threshold).await {
            Ok(secret) => {
                self.secret = Some(secret);
                self.phase = RecoveryPhase::Recovered;
                info!(epoch = self.epoch, "ledger secret recovered");
                Ok(ShareOutcome::Recovered { epoch: self.epoch })
            }
            Err(e) => {
                error!(epoch = self.epoch, error = %e, "recovery share combination failed");
                self.phase = RecoveryPhase::Failed;
                self.failure = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use consortium_core::{ConsortiumConfig, CryptoError, PhysicalTime};
    use consortium_governance::{
        Ballot, Governance, MemberInfo, MemberStatus, ProposalAction, ProposalState,
    };

    /// Decryption succeeds only against the expected sender key; combination
    /// concatenates shares.
    struct StubCrypto {
        sender: KeyRef,
        fail_combine: bool,
    }

    #[async_trait]
    impl CryptoEffects for StubCrypto {
        async fn sign(&self, _key: &KeyRef, payload: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
            Ok(payload.to_vec())
        }

        async fn decrypt_share(
            &self,
            ciphertext: &[u8],
            _nonce: &[u8],
            _recipient: &KeyRef,
            sender: &KeyRef,
        ) -> std::result::Result<DecryptedShare, CryptoError> {
            if sender != &self.sender {
                return Err(CryptoError::DecryptionFailed {
                    reason: "wrong sender key".into(),
                });
            }
            Ok(DecryptedShare::new(ciphertext.to_vec()))
        }

        async fn combine_shares(
            &self,
            shares: &[DecryptedShare],
            _threshold: usize,
        ) -> std::result::Result<RecoveredSecret, CryptoError> {
            if self.fail_combine {
                return Err(CryptoError::CombinationFailed {
                    reason: "inconsistent shares".into(),
                });
            }
            Ok(RecoveredSecret::new(
                shares.iter().flat_map(|s| s.as_bytes().to_vec()).collect(),
            ))
        }
    }

    fn crypto() -> StubCrypto {
        StubCrypto {
            sender: KeyRef::new("network-old"),
            fail_combine: false,
        }
    }

    /// Governance waiting for recovery with three Active members, plus the
    /// grant from an accepted `AcceptRecovery`.
    fn recovering(threshold: usize) -> (Governance, RecoveryGrant) {
        let members = (0..3)
            .map(|i| MemberInfo::new(format!("pk{i}"), format!("enc{i}")))
            .collect();
        let (mut gov, _) =
            Governance::recovering(&ConsortiumConfig::default(), members, threshold).unwrap();
        let update = gov
            .submit_proposal(
                MemberId(0),
                ProposalAction::AcceptRecovery,
                PhysicalTime::from_ms(0),
            )
            .unwrap();
        let update = gov
            .vote(update.summary.proposal_id, MemberId(1), Ballot::Approve, true)
            .unwrap();
        assert_eq!(update.summary.state, ProposalState::Accepted);
        let grant = update.recovery.unwrap();
        (gov, grant)
    }

    fn share(member: u64) -> EncryptedShare {
        EncryptedShare {
            member_id: MemberId(member),
            ciphertext: vec![member as u8],
            nonce: vec![0],
        }
    }

    fn armed(threshold: usize) -> (Governance, RecoveryCoordinator) {
        let (gov, grant) = recovering(threshold);
        let mut coordinator = RecoveryCoordinator::new();
        coordinator.accept_recovery(grant).unwrap();
        coordinator.arm(KeyRef::new("network-old")).unwrap();
        (gov, coordinator)
    }

    #[tokio::test]
    async fn test_threshold_two_recovers_on_second_share() {
        let (gov, mut coordinator) = armed(2);
        let crypto = crypto();

        let outcome = coordinator
            .submit_share(&crypto, gov.member(&MemberId(0)).unwrap(), &share(0))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ShareOutcome::Pending {
                submitted: 1,
                threshold: 2
            }
        );

        let outcome = coordinator
            .submit_share(&crypto, gov.member(&MemberId(1)).unwrap(), &share(1))
            .await
            .unwrap();
        assert_eq!(outcome, ShareOutcome::Recovered { epoch: 1 });
        assert_eq!(coordinator.secret().unwrap().as_bytes(), &[0, 1]);

        let status = coordinator.status();
        assert_eq!(status.phase, RecoveryPhase::Recovered);
        assert_eq!(status.submitted, 2);
        assert_eq!(status.threshold, 2);

        assert_matches!(
            coordinator
                .submit_share(&crypto, gov.member(&MemberId(2)).unwrap(), &share(2))
                .await,
            Err(ConsortiumError::RecoveryAlreadyComplete)
        );
    }

    #[tokio::test]
    async fn test_duplicate_share_not_double_counted() {
        let (gov, mut coordinator) = armed(3);
        let crypto = crypto();
        let member = gov.member(&MemberId(0)).unwrap();
        coordinator.submit_share(&crypto, member, &share(0)).await.unwrap();
        assert_matches!(
            coordinator.submit_share(&crypto, member, &share(0)).await,
            Err(ConsortiumError::DuplicateShare { .. })
        );
        assert_eq!(coordinator.status().submitted, 1);
    }

    #[tokio::test]
    async fn test_inactive_member_refused() {
        let (gov, mut coordinator) = armed(2);
        let mut retired = gov.member(&MemberId(2)).unwrap().clone();
        retired.status = MemberStatus::Retired;
        assert_matches!(
            coordinator.submit_share(&crypto(), &retired, &share(2)).await,
            Err(ConsortiumError::Unauthorized { .. })
        );
    }

    #[tokio::test]
    async fn test_shares_refused_before_arming() {
        let (gov, grant) = recovering(2);
        let mut coordinator = RecoveryCoordinator::new();
        let member = gov.member(&MemberId(0)).unwrap();
        assert_matches!(
            coordinator.submit_share(&crypto(), member, &share(0)).await,
            Err(ConsortiumError::StateConflict { .. })
        );
        coordinator.accept_recovery(grant).unwrap();
        assert_matches!(
            coordinator.submit_share(&crypto(), member, &share(0)).await,
            Err(ConsortiumError::StateConflict { .. })
        );
    }

    #[tokio::test]
    async fn test_decrypts_against_archived_key_only() {
        let (gov, grant) = recovering(2);
        let mut coordinator = RecoveryCoordinator::new();
        coordinator.accept_recovery(grant).unwrap();
        coordinator.arm(KeyRef::new("network-current")).unwrap();
        assert_matches!(
            coordinator
                .submit_share(&crypto(), gov.member(&MemberId(0)).unwrap(), &share(0))
                .await,
            Err(ConsortiumError::Crypto(CryptoError::DecryptionFailed { .. }))
        );
        assert_eq!(coordinator.status().submitted, 0);
    }

    #[tokio::test]
    async fn test_failed_combination_allows_new_epoch() {
        let (mut gov, grant) = recovering(1);
        let mut coordinator = RecoveryCoordinator::new();
        coordinator.accept_recovery(grant).unwrap();
        coordinator.arm(KeyRef::new("network-old")).unwrap();
        let failing = StubCrypto {
            sender: KeyRef::new("network-old"),
            fail_combine: true,
        };
        assert_matches!(
            coordinator
                .submit_share(&failing, gov.member(&MemberId(0)).unwrap(), &share(0))
                .await,
            Err(ConsortiumError::Crypto(CryptoError::CombinationFailed { .. }))
        );
        assert_eq!(coordinator.phase(), RecoveryPhase::Failed);
        assert_eq!(coordinator.status().submitted, 1);

        gov.recovery_failed(1).unwrap();
        let update = gov
            .submit_proposal(
                MemberId(0),
                ProposalAction::AcceptRecovery,
                PhysicalTime::from_ms(1),
            )
            .unwrap();
        let update = gov
            .vote(update.summary.proposal_id, MemberId(1), Ballot::Approve, true)
            .unwrap();
        let grant = update.recovery.unwrap();
        assert_eq!(grant.epoch(), 2);
        coordinator.accept_recovery(grant).unwrap();
        assert_eq!(coordinator.phase(), RecoveryPhase::RecoveryPending);
        assert_eq!(coordinator.status().submitted, 0);
    }

    #[test]
    fn test_stale_grant_refused() {
        let (_, grant) = recovering(2);
        let mut coordinator = RecoveryCoordinator::new();
        coordinator.accept_recovery(grant.clone()).unwrap();
        assert_matches!(
            coordinator.accept_recovery(grant),
            Err(ConsortiumError::StateConflict { .. })
        );
    }
}
