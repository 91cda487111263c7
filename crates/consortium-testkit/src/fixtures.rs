//! Test networks: one node, its members, and a client per member
//!
//! A recovering network has the archived network key and one encrypted
//! share per member published in the ledger, as a restarted service would
//! find them.

use crate::crypto::MockCrypto;
use crate::effects::{MemberEffects, TestEffects};
use crate::replica::ScriptedReplica;
use crate::transport::InProcessTransport;
use consortium_client::{MemberClient, Orchestrator, RECOVERY_SHARES_TABLE};
use consortium_core::{ConsortiumConfig, KeyRef, MemberId, SelectionStrategy, WaitConfig};
use consortium_governance::MemberInfo;
use consortium_node::{ConsortiumNode, NETWORK_KEYS_TABLE, PREVIOUS_NETWORK_KEY};
use consortium_recovery::EncryptedShare;
use serde_json::json;
use std::sync::Arc;

/// Network key that encrypted the shares of a recovering network
pub const ARCHIVED_NETWORK_KEY: &str = "network-key-archived";

/// Ledger secret dealt to the members of a recovering network
pub const LEDGER_SECRET: &[u8] = b"ledger-secret-0";

/// Configuration with short waits
pub fn test_config() -> ConsortiumConfig {
    ConsortiumConfig {
        wait: WaitConfig {
            default_timeout_ms: 2_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 50,
            backoff_multiplier: 2.0,
        },
        ..ConsortiumConfig::default()
    }
}

/// Keys of the `index`th test member
pub fn member_info(index: usize) -> MemberInfo {
    MemberInfo::new(
        format!("member-{index}-sign"),
        format!("member-{index}-enc"),
    )
}

/// A member known to the fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMember {
    /// Assigned identifier
    pub id: MemberId,
    /// Key the member's client signs with
    pub signing_key: KeyRef,
    /// Key the member's recovery share is encrypted to
    pub encryption_key: KeyRef,
}

impl TestMember {
    fn new(id: MemberId, info: &MemberInfo) -> Self {
        Self {
            id,
            signing_key: info.public_key.clone(),
            encryption_key: info.encryption_key.clone(),
        }
    }
}

/// A node with its members
pub struct TestNetwork {
    /// The node
    pub node: Arc<ConsortiumNode<TestEffects>>,
    /// Effects shared by the node and every client
    pub effects: TestEffects,
    /// Members in registration order
    pub members: Vec<TestMember>,
    /// Replica answering commit status queries
    pub replica: Arc<ScriptedReplica>,
    /// Configuration given to the node and clients
    pub config: ConsortiumConfig,
}

impl TestNetwork {
    /// Open a new service with `members` founders on a controllable clock
    pub fn genesis(members: usize) -> Self {
        Self::genesis_with(test_config(), TestEffects::deterministic(), members)
    }

    /// Open a new service with explicit configuration and effects
    pub fn genesis_with(config: ConsortiumConfig, effects: TestEffects, members: usize) -> Self {
        let infos: Vec<MemberInfo> = (0..members).map(member_info).collect();
        let (node, ids) = ConsortiumNode::genesis(effects.clone(), config.clone(), infos.clone())
            .expect("genesis network");
        Self::assemble(node, effects, config, &infos, ids)
    }

    /// Restart a service whose ledger secret is lost, with `members`
    /// Active members and `threshold` shares needed
    pub fn recovering(members: usize, threshold: usize) -> Self {
        Self::recovering_with(
            test_config(),
            TestEffects::deterministic(),
            members,
            threshold,
        )
    }

    /// Restart a recovering service with explicit configuration and effects
    pub fn recovering_with(
        config: ConsortiumConfig,
        effects: TestEffects,
        members: usize,
        threshold: usize,
    ) -> Self {
        let infos: Vec<MemberInfo> = (0..members).map(member_info).collect();
        let (node, ids) = ConsortiumNode::start_in_recovery(
            effects.clone(),
            config.clone(),
            infos.clone(),
            threshold,
        )
        .expect("recovering network");
        let network = Self::assemble(node, effects, config, &infos, ids);

        network.effects.ledger().insert(
            NETWORK_KEYS_TABLE,
            PREVIOUS_NETWORK_KEY,
            json!(ARCHIVED_NETWORK_KEY),
        );
        let shares = MockCrypto::deal_shares(LEDGER_SECRET, members);
        for (member, share) in network.members.iter().zip(&shares) {
            network.publish_share(member.id, share, &KeyRef::new(ARCHIVED_NETWORK_KEY));
        }
        network
    }

    fn assemble(
        node: ConsortiumNode<TestEffects>,
        effects: TestEffects,
        config: ConsortiumConfig,
        infos: &[MemberInfo],
        ids: Vec<MemberId>,
    ) -> Self {
        let members = ids
            .into_iter()
            .zip(infos)
            .map(|(id, info)| TestMember::new(id, info))
            .collect();
        Self {
            node: Arc::new(node),
            effects,
            members,
            replica: Arc::new(ScriptedReplica::new()),
            config,
        }
    }

    /// Fixture record for `member`
    pub fn member(&self, member: MemberId) -> &TestMember {
        self.members
            .iter()
            .find(|m| m.id == member)
            .expect("member is part of the network")
    }

    /// Identifiers of every member
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Record a member admitted after startup so clients can be built for it
    pub fn register_member(&mut self, member: MemberId, info: &MemberInfo) {
        self.members.push(TestMember::new(member, info));
    }

    /// Encrypt `plaintext` to `member` as `sender` and publish it as the
    /// member's recovery share
    pub fn publish_share(&self, member: MemberId, plaintext: &[u8], sender: &KeyRef) {
        let encryption_key = self.member(member).encryption_key.clone();
        let nonce = format!("nonce-{}", member.value()).into_bytes();
        let share = EncryptedShare {
            member_id: member,
            ciphertext: MockCrypto::encrypt_share(plaintext, &encryption_key, sender, &nonce),
            nonce,
        };
        self.effects.ledger().insert(
            RECOVERY_SHARES_TABLE,
            &member.value().to_string(),
            serde_json::to_value(share).expect("share serializes"),
        );
    }

    /// `member`'s recovery share as published in the ledger
    pub fn published_share(&self, member: MemberId) -> EncryptedShare {
        let value = self
            .effects
            .ledger()
            .get(RECOVERY_SHARES_TABLE, &member.value().to_string())
            .expect("share is published");
        serde_json::from_value(value).expect("share deserializes")
    }

    /// Publish the correctly dealt share of `member` again
    pub fn restore_share(&self, member: MemberId) {
        let position = self.position(member);
        let shares = MockCrypto::deal_shares(LEDGER_SECRET, self.members.len());
        self.publish_share(member, &shares[position], &KeyRef::new(ARCHIVED_NETWORK_KEY));
    }

    fn position(&self, member: MemberId) -> usize {
        self.members
            .iter()
            .position(|m| m.id == member)
            .expect("member is part of the network")
    }

    /// Replace `member`'s share with one of a different secret, so any
    /// combination including it fails
    pub fn forge_share(&self, member: MemberId) {
        let position = self.position(member);
        let forged = MockCrypto::deal_shares(b"forged-secret", self.members.len());
        self.publish_share(member, &forged[position], &KeyRef::new(ARCHIVED_NETWORK_KEY));
    }

    /// Transport carrying `member`'s requests to the node
    pub fn transport(&self, member: MemberId) -> Arc<InProcessTransport> {
        Arc::new(
            InProcessTransport::new(self.node.clone(), member)
                .with_replica(self.replica.clone()),
        )
    }

    /// Client for `member` over a fresh transport
    pub fn client(&self, member: MemberId) -> MemberClient<MemberEffects> {
        self.client_over(member, self.transport(member))
    }

    /// Client for `member` over `transport`
    pub fn client_over(
        &self,
        member: MemberId,
        transport: Arc<InProcessTransport>,
    ) -> MemberClient<MemberEffects> {
        let signing_key = self.member(member).signing_key.clone();
        MemberClient::new(
            MemberEffects::new(self.effects.clone(), transport),
            member,
            signing_key,
            self.config.clone(),
        )
    }

    /// One client per member, in registration order
    pub fn clients(&self) -> Vec<MemberClient<MemberEffects>> {
        self.members.iter().map(|m| self.client(m.id)).collect()
    }

    /// Orchestrator over every member's client
    pub fn orchestrator(&self, strategy: SelectionStrategy) -> Orchestrator<MemberEffects> {
        Orchestrator::new(self.clients(), strategy)
    }

    /// Orchestrator whose selection follows the network configuration
    pub fn configured_orchestrator(&self) -> Orchestrator<MemberEffects> {
        Orchestrator::from_config(self.clients(), &self.config)
    }
}
