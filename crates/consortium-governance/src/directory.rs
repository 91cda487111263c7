//! Member directory
//!
//! Owns every member record and the governance root digest. Members enter
//! `Accepted`, become `Active` only by acknowledging the current root digest,
//! and leave only through an enacted `RetireMember` proposal.

use crate::governance::Enactment;
use crate::member::{Member, MemberInfo, MemberStatus};
use crate::proposal::ProposalAction;
use crate::registry::quorum_threshold;
use consortium_core::{ConsortiumError, MemberId, Result, StateDigest};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Snapshot of the Active members at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    members: BTreeSet<MemberId>,
}

impl ActiveSet {
    /// Number of Active members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no member is Active
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `member` was Active when the snapshot was taken
    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// Approvals needed for a proposal to pass against this set
    pub fn quorum_threshold(&self) -> usize {
        quorum_threshold(self.members.len())
    }

    /// Iterate Active members in id order
    pub fn iter(&self) -> impl Iterator<Item = &MemberId> {
        self.members.iter()
    }
}

impl FromIterator<MemberId> for ActiveSet {
    fn from_iter<I: IntoIterator<Item = MemberId>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

/// Member records and the root digest they acknowledge
#[derive(Debug, Clone)]
pub struct MemberDirectory {
    members: BTreeMap<MemberId, Member>,
    next_id: u64,
    root: StateDigest,
    pending_acks: BTreeMap<MemberId, StateDigest>,
}

impl Default for MemberDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberDirectory {
    /// Empty directory at the genesis digest
    pub fn new() -> Self {
        Self {
            members: BTreeMap::new(),
            next_id: 0,
            root: StateDigest::genesis(),
            pending_acks: BTreeMap::new(),
        }
    }

    /// Admit a member in `Accepted` status
    pub fn register(&mut self, info: MemberInfo) -> Result<MemberId> {
        if info.public_key.is_empty() || info.encryption_key.is_empty() {
            return Err(ConsortiumError::invalid(
                "member keys must not be empty",
            ));
        }
        if self
            .members
            .values()
            .any(|m| m.public_key == info.public_key)
        {
            return Err(ConsortiumError::invalid(format!(
                "a member with public key {} already exists",
                info.public_key
            )));
        }

        let id = MemberId(self.next_id);
        self.next_id += 1;
        self.members
            .insert(id, Member::from_info(id, MemberStatus::Accepted, info));
        self.advance_root(format!("member-registered:{id}").as_bytes());
        debug!(member = %id, "member registered");
        Ok(id)
    }

    /// Admit a founding member directly in `Active` status
    pub(crate) fn register_founder(&mut self, info: MemberInfo) -> Result<MemberId> {
        let id = self.register(info)?;
        if let Some(member) = self.members.get_mut(&id) {
            member.status = MemberStatus::Active;
        }
        self.advance_root(format!("member-founded:{id}").as_bytes());
        Ok(id)
    }

    /// Look up a member
    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.get(id)
    }

    /// Look up a member, failing with `NotFound`
    pub fn member(&self, id: &MemberId) -> Result<&Member> {
        self.members
            .get(id)
            .ok_or_else(|| ConsortiumError::not_found(format!("{id} does not exist")))
    }

    /// All members in id order
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Current root digest
    pub fn root_digest(&self) -> StateDigest {
        self.root
    }

    /// Fold a governance mutation into the root digest
    pub(crate) fn advance_root(&mut self, event: &[u8]) {
        self.root = self.root.advance(event);
    }

    /// Record and return the digest `member` should acknowledge
    pub fn update_ack_state_digest(&mut self, member: MemberId) -> Result<StateDigest> {
        let record = self.member(&member)?;
        if record.status == MemberStatus::Retired {
            return Err(ConsortiumError::unauthorized(format!(
                "{member} is retired"
            )));
        }
        self.pending_acks.insert(member, self.root);
        Ok(self.root)
    }

    /// Acknowledge `digest`, moving an `Accepted` member to `Active`.
    ///
    /// The member must first fetch a digest with `update_ack_state_digest`,
    /// and `digest` must match both that record and the current root. An
    /// `Active` member may re-acknowledge; its status is unchanged.
    pub fn activate(&mut self, member: MemberId, digest: StateDigest) -> Result<()> {
        let status = self.member(&member)?.status;
        if status == MemberStatus::Retired {
            return Err(ConsortiumError::unauthorized(format!(
                "{member} is retired"
            )));
        }
        let requested = self.pending_acks.get(&member).copied().ok_or_else(|| {
            ConsortiumError::state_conflict(format!(
                "{member} has no outstanding acknowledgement request"
            ))
        })?;
        if digest != requested || digest != self.root {
            warn!(member = %member, "acknowledgement against stale digest");
            return Err(ConsortiumError::StaleAck { member });
        }

        self.pending_acks.remove(&member);
        if status == MemberStatus::Accepted {
            if let Some(record) = self.members.get_mut(&member) {
                record.status = MemberStatus::Active;
            }
            self.advance_root(format!("member-activated:{member}").as_bytes());
            info!(member = %member, "member activated");
        }
        Ok(())
    }

    /// Retire `member` on behalf of an enacted `RetireMember` proposal
    pub fn retire(&mut self, member: MemberId, enactment: &Enactment) -> Result<()> {
        if enactment.action() != &(ProposalAction::RetireMember { member }) {
            return Err(ConsortiumError::unauthorized(format!(
                "{} does not retire {member}",
                enactment.proposal()
            )));
        }
        let record = self
            .members
            .get_mut(&member)
            .ok_or_else(|| ConsortiumError::not_found(format!("{member} does not exist")))?;
        if record.status == MemberStatus::Retired {
            return Err(ConsortiumError::state_conflict(format!(
                "{member} is already retired"
            )));
        }
        record.status = MemberStatus::Retired;
        self.pending_acks.remove(&member);
        self.advance_root(format!("member-retired:{member}").as_bytes());
        info!(member = %member, proposal_id = %enactment.proposal(), "member retired");
        Ok(())
    }

    /// Replace a member's opaque data
    pub(crate) fn set_member_data(
        &mut self,
        member: MemberId,
        data: serde_json::Value,
    ) -> Result<()> {
        let record = self
            .members
            .get_mut(&member)
            .ok_or_else(|| ConsortiumError::not_found(format!("{member} does not exist")))?;
        if record.status == MemberStatus::Retired {
            return Err(ConsortiumError::state_conflict(format!(
                "{member} is retired"
            )));
        }
        record.member_data = data;
        self.advance_root(format!("member-data:{member}").as_bytes());
        Ok(())
    }

    /// Snapshot of the currently Active members
    pub fn active_members(&self) -> ActiveSet {
        self.members
            .values()
            .filter(|m| m.is_active())
            .map(|m| m.id)
            .collect()
    }

    /// Digest last handed to `member` by `update_ack_state_digest`
    pub fn pending_ack(&self, member: &MemberId) -> Option<StateDigest> {
        self.pending_acks.get(member).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn info(n: u64) -> MemberInfo {
        MemberInfo::new(format!("pk{n}"), format!("enc{n}"))
    }

    #[test]
    fn test_register_starts_accepted() {
        let mut dir = MemberDirectory::new();
        let id = dir.register(info(0)).unwrap();
        assert_eq!(dir.member(&id).unwrap().status, MemberStatus::Accepted);
        assert!(dir.active_members().is_empty());
    }

    #[test]
    fn test_duplicate_public_key_rejected() {
        let mut dir = MemberDirectory::new();
        dir.register(info(0)).unwrap();
        let mut dup = info(1);
        dup.public_key = consortium_core::KeyRef::new("pk0");
        assert_matches!(dir.register(dup), Err(ConsortiumError::Invalid { .. }));
    }

    #[test]
    fn test_ack_flow_activates() {
        let mut dir = MemberDirectory::new();
        let id = dir.register(info(0)).unwrap();
        let digest = dir.update_ack_state_digest(id).unwrap();
        assert_eq!(dir.pending_ack(&id), Some(digest));
        dir.activate(id, digest).unwrap();
        assert!(dir.member(&id).unwrap().is_active());
        assert_eq!(dir.active_members().len(), 1);
    }

    #[test]
    fn test_stale_ack_rejected() {
        let mut dir = MemberDirectory::new();
        let id = dir.register(info(0)).unwrap();
        let digest = dir.update_ack_state_digest(id).unwrap();
        dir.register(info(1)).unwrap();
        assert_matches!(
            dir.activate(id, digest),
            Err(ConsortiumError::StaleAck { member }) if member == id
        );
        assert_eq!(dir.member(&id).unwrap().status, MemberStatus::Accepted);
    }

    #[test]
    fn test_ack_requires_requested_digest() {
        let mut dir = MemberDirectory::new();
        let id = dir.register(info(0)).unwrap();
        let root = dir.root_digest();
        assert_matches!(
            dir.activate(id, root),
            Err(ConsortiumError::StateConflict { .. })
        );
        assert_eq!(dir.member(&id).unwrap().status, MemberStatus::Accepted);

        let digest = dir.update_ack_state_digest(id).unwrap();
        dir.activate(id, digest).unwrap();
        assert_eq!(dir.pending_ack(&id), None);

        // Consumed by the activation; re-acknowledging needs a fresh request
        let root = dir.root_digest();
        assert_matches!(
            dir.activate(id, root),
            Err(ConsortiumError::StateConflict { .. })
        );
        let digest = dir.update_ack_state_digest(id).unwrap();
        dir.activate(id, digest).unwrap();
        assert_eq!(dir.root_digest(), root);
    }

    #[test]
    fn test_unknown_member() {
        let mut dir = MemberDirectory::new();
        assert_matches!(
            dir.update_ack_state_digest(MemberId(9)),
            Err(ConsortiumError::NotFound { .. })
        );
    }

    #[test]
    fn test_active_set_threshold() {
        let set: ActiveSet = (0..4).map(MemberId).collect();
        assert_eq!(set.quorum_threshold(), 3);
        assert!(set.contains(&MemberId(3)));
        assert!(!set.contains(&MemberId(4)));
    }
}
