//! Member clients driving governance over the in-process transport

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use assert_matches::assert_matches;
use consortium_core::{ConsortiumError, ErrorKind, KeyRef, MemberId, SelectionStrategy};
use consortium_governance::{Ballot, MemberStatus, ProposalAction, ProposalState};
use consortium_testkit::{init_test_tracing, member_info, MemberEffects, TestNetwork};
use consortium_client::MemberClient;
use serde_json::Value;

fn add_member_action(index: usize) -> ProposalAction {
    let info = member_info(index);
    ProposalAction::AddMember {
        public_key: info.public_key,
        encryption_key: info.encryption_key,
        member_data: Value::Null,
    }
}

#[tokio::test]
async fn test_admitted_member_must_ack_before_acting() {
    init_test_tracing();
    let mut network = TestNetwork::genesis(3);
    let mut orchestrator = network.orchestrator(SelectionStrategy::default());

    let summary = orchestrator
        .propose_and_accept(add_member_action(3))
        .await
        .unwrap();
    assert_eq!(summary.state, ProposalState::Accepted);

    let newcomer = MemberId(3);
    network.register_member(newcomer, &member_info(3));
    let client = network.client(newcomer);
    assert_eq!(
        client.member(newcomer).await.unwrap().status,
        MemberStatus::Accepted
    );

    let refused = client.propose(ProposalAction::OpenNetwork).await;
    assert_matches!(refused, Err(ConsortiumError::Invalid { .. }));

    let digest = client.ack().await.unwrap();
    assert_ne!(digest, network.node.read(|g| g.root_digest()));
    assert_eq!(
        client.member(newcomer).await.unwrap().status,
        MemberStatus::Active
    );

    let summary = client.propose(ProposalAction::OpenNetwork).await.unwrap();
    assert_eq!(summary.state, ProposalState::Open);
    assert_eq!(summary.threshold, 3);
}

#[tokio::test]
async fn test_ack_without_requested_digest_is_refused() {
    let mut network = TestNetwork::genesis(1);
    let founder = network.members[0].id;
    network
        .client(founder)
        .propose(add_member_action(1))
        .await
        .unwrap();
    let newcomer = MemberId(1);
    network.register_member(newcomer, &member_info(1));

    let root = network.node.read(|g| g.root_digest());
    let result = network.node.activate_member(newcomer, root);
    assert_matches!(result, Err(ConsortiumError::StateConflict { .. }));
    assert_eq!(
        network.node.member(newcomer).unwrap().status,
        MemberStatus::Accepted
    );

    network.client(newcomer).ack().await.unwrap();
    assert_eq!(
        network.node.member(newcomer).unwrap().status,
        MemberStatus::Active
    );
}

#[tokio::test]
async fn test_ack_against_stale_digest_is_refused() {
    let mut network = TestNetwork::genesis(1);
    let founder = network.members[0].id;
    network
        .client(founder)
        .propose(add_member_action(1))
        .await
        .unwrap();
    let newcomer = MemberId(1);
    network.register_member(newcomer, &member_info(1));

    let digest = network.node.update_ack_state_digest(newcomer).unwrap();
    network
        .client(founder)
        .propose(ProposalAction::OpenNetwork)
        .await
        .unwrap();

    let result = network.node.activate_member(newcomer, digest);
    assert_matches!(result, Err(ConsortiumError::StaleAck { member }) if member == newcomer);
    assert_eq!(
        network.node.member(newcomer).unwrap().status,
        MemberStatus::Accepted
    );
}

#[tokio::test]
async fn test_rejections_close_a_proposal() {
    let network = TestNetwork::genesis(3);
    let clients = network.clients();

    let summary = clients[0]
        .propose(ProposalAction::OpenNetwork)
        .await
        .unwrap();
    let summary = clients[1]
        .vote(summary.proposal_id, Ballot::Reject)
        .await
        .unwrap();
    assert_eq!(summary.state, ProposalState::Open);
    let summary = clients[2]
        .vote(summary.proposal_id, Ballot::Reject)
        .await
        .unwrap();
    assert_eq!(summary.state, ProposalState::Rejected);
    assert_eq!(summary.rejections, 2);

    let late = clients[0].complete(summary.proposal_id).await;
    assert_matches!(late, Err(ConsortiumError::StateConflict { .. }));
}

#[tokio::test]
async fn test_duplicate_vote_is_decoded_as_typed_error() {
    let network = TestNetwork::genesis(3);
    let clients = network.clients();
    let summary = clients[0]
        .propose(ProposalAction::OpenNetwork)
        .await
        .unwrap();

    let result = clients[0].vote(summary.proposal_id, Ballot::Approve).await;
    assert_matches!(
        result,
        Err(ConsortiumError::DuplicateVote { proposal, member })
            if proposal == summary.proposal_id && member == clients[0].member_id()
    );
}

#[tokio::test]
async fn test_retiring_a_member_drops_its_open_proposals() {
    let network = TestNetwork::genesis(3);
    let ids = network.member_ids();
    let leaving = network.client(ids[2]);
    let pending = leaving
        .propose(ProposalAction::NewCode {
            code_digest: "ab".repeat(32),
        })
        .await
        .unwrap();
    assert_eq!(pending.state, ProposalState::Open);

    let mut orchestrator = network.orchestrator(SelectionStrategy::default());
    let summary = orchestrator
        .propose_and_accept(ProposalAction::RetireMember { member: ids[2] })
        .await
        .unwrap();
    assert_eq!(summary.state, ProposalState::Accepted);

    let dropped = network.client(ids[0]).proposal(pending.proposal_id).await.unwrap();
    assert_eq!(dropped.state, ProposalState::Dropped);

    let next = network
        .client(ids[0])
        .propose(ProposalAction::OpenNetwork)
        .await
        .unwrap();
    let refused = leaving.vote(next.proposal_id, Ballot::Approve).await;
    assert_eq!(refused.unwrap_err().kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_seeded_orchestrator_reaches_quorum() {
    let network = TestNetwork::genesis(5);
    let mut orchestrator = network.orchestrator(SelectionStrategy::from_seed(Some(7)));

    let summary = orchestrator
        .propose_and_accept(ProposalAction::SetRecoveryThreshold { threshold: 3 })
        .await
        .unwrap();
    assert_eq!(summary.state, ProposalState::Accepted);
    assert_eq!(summary.approvals, 3);
    assert_eq!(network.node.service().recovery_threshold, 3);
}

#[tokio::test]
async fn test_request_signed_with_wrong_key_is_unauthenticated() {
    let network = TestNetwork::genesis(3);
    let member = network.members[0].id;
    let transport = network.transport(member);
    let impostor = MemberClient::new(
        MemberEffects::new(network.effects.clone(), transport.clone()),
        member,
        KeyRef::new("stolen-key"),
        network.config.clone(),
    );

    let result = impostor.propose(ProposalAction::OpenNetwork).await;
    assert_matches!(result, Err(ConsortiumError::Unauthorized { .. }));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].signed);
    assert!(!requests[0].authenticated);
}

#[tokio::test]
async fn test_wait_for_proposal_state_over_transport() {
    let network = TestNetwork::genesis(3);
    let clients = network.clients();
    let summary = clients[0]
        .propose(ProposalAction::OpenNetwork)
        .await
        .unwrap();
    clients[1]
        .vote(summary.proposal_id, Ballot::Approve)
        .await
        .unwrap();

    let deadline = clients[2].default_deadline();
    let accepted = clients[2]
        .wait_for_proposal_state(summary.proposal_id, ProposalState::Accepted, deadline)
        .await
        .unwrap();
    assert_eq!(accepted.state, ProposalState::Accepted);

    let result = clients[2]
        .wait_for_proposal_state(summary.proposal_id, ProposalState::Rejected, deadline)
        .await;
    assert_matches!(result, Err(ConsortiumError::StateConflict { .. }));
}
