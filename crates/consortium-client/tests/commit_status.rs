//! Commit status queries, waits and history checks through a member client

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use assert_matches::assert_matches;
use consortium_client::{cross_check, parse_history};
use consortium_commit::TxStatus;
use consortium_core::{ConsortiumError, Deadline, TxId};
use consortium_testkit::TestNetwork;

#[tokio::test]
async fn test_wait_for_commit_after_pending() {
    let network = TestNetwork::genesis(1);
    let client = network.client(network.members[0].id);
    let tx = TxId::new(2, 10);
    network.replica.script(
        tx,
        [TxStatus::Unknown, TxStatus::Pending, TxStatus::Committed],
    );

    client
        .wait_for_commit(tx, Deadline::after_ms(1_000))
        .await
        .unwrap();
    assert_eq!(client.tracker().lock().status(&tx), TxStatus::Committed);
    assert_eq!(network.replica.queries().len(), 3);
}

#[tokio::test]
async fn test_wait_for_invalidated_transaction() {
    let network = TestNetwork::genesis(1);
    let client = network.client(network.members[0].id);
    let tx = TxId::new(1, 4);
    network
        .replica
        .script(tx, [TxStatus::Pending, TxStatus::Invalid]);

    let result = client.wait_for_commit(tx, Deadline::after_ms(1_000)).await;
    assert_matches!(result, Err(ConsortiumError::TransactionInvalid { tx: failed }) if failed == tx);
}

#[tokio::test]
async fn test_wait_for_commit_times_out() {
    let network = TestNetwork::genesis(1);
    let client = network.client(network.members[0].id);
    let tx = TxId::new(1, 1);
    network.replica.set(tx, TxStatus::Pending);

    let result = client.wait_for_commit(tx, Deadline::after_ms(300)).await;
    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(err, ConsortiumError::Timeout { .. });
}

#[tokio::test]
async fn test_status_regression_is_a_safety_violation() {
    let network = TestNetwork::genesis(1);
    let client = network.client(network.members[0].id);
    let tx = TxId::new(3, 7);
    network
        .replica
        .script(tx, [TxStatus::Committed, TxStatus::Pending]);

    assert_eq!(
        client.get_commit_status(tx).await.unwrap(),
        TxStatus::Committed
    );
    let err = client.get_commit_status(tx).await.unwrap_err();
    assert!(err.is_safety_violation());
    assert_matches!(err, ConsortiumError::InvalidTransition { .. });
}

#[tokio::test]
async fn test_two_views_committing_one_seqno_conflict() {
    let network = TestNetwork::genesis(1);
    let client = network.client(network.members[0].id);
    network.replica.set(TxId::new(1, 5), TxStatus::Committed);
    network.replica.set(TxId::new(2, 5), TxStatus::Committed);

    client.get_commit_status(TxId::new(1, 5)).await.unwrap();
    let err = client.get_commit_status(TxId::new(2, 5)).await.unwrap_err();
    assert_matches!(
        err,
        ConsortiumError::ConflictingCommit { seqno: 5, views } if views == vec![1, 2]
    );
}

#[tokio::test]
async fn test_reconstructed_histories_agree() {
    let network = TestNetwork::genesis(2);
    network.replica.commit_linear(&[1, 1, 2, 2, 3]);
    let commit = TxId::new(3, 5);

    let first = network
        .client(network.members[0].id)
        .reconstruct_history(commit)
        .await
        .unwrap();
    let second = network
        .client(network.members[1].id)
        .reconstruct_history(commit)
        .await
        .unwrap();

    let expected = parse_history(["1.1", "1.2", "2.3", "2.4", "3.5"]).unwrap();
    assert_eq!(first, expected);
    assert_eq!(cross_check(&first, &second).unwrap(), 5);
}

#[tokio::test]
async fn test_gap_in_history_is_missing_commit() {
    let network = TestNetwork::genesis(1);
    network.replica.commit_linear(&[1, 1]);
    let client = network.client(network.members[0].id);

    let result = client.reconstruct_history(TxId::new(1, 3)).await;
    assert_matches!(result, Err(ConsortiumError::MissingCommit { seqno: 3 }));
}

#[test]
fn test_divergent_histories() {
    let a = parse_history(["1.1", "1.2", "1.3"]).unwrap();
    let b = parse_history(["1.1", "2.2"]).unwrap();

    let err = cross_check(&a, &b).unwrap_err();
    assert_matches!(err, ConsortiumError::DivergentHistory { index: 1, .. });
    assert!(err.is_safety_violation());
}
