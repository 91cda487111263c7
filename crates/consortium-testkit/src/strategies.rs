//! Property test strategies for consortium types

use consortium_commit::TxStatus;
use consortium_core::{MemberId, TxId};
use consortium_governance::Ballot;
use proptest::prelude::*;

pub use proptest;

/// Consortium sizes worth exploring
pub fn arb_member_count() -> impl Strategy<Value = usize> {
    1usize..=9
}

/// Any transaction status
pub fn arb_tx_status() -> impl Strategy<Value = TxStatus> {
    prop_oneof![
        Just(TxStatus::Unknown),
        Just(TxStatus::Pending),
        Just(TxStatus::Committed),
        Just(TxStatus::Invalid),
    ]
}

/// Transaction ids in a small view and seqno range, so collisions happen
pub fn arb_tx_id() -> impl Strategy<Value = TxId> {
    (1u64..=4, 1u64..=8).prop_map(|(view, seqno)| TxId::new(view, seqno))
}

/// Any ballot
pub fn arb_ballot() -> impl Strategy<Value = Ballot> {
    prop_oneof![Just(Ballot::Approve), Just(Ballot::Reject)]
}

/// A consortium size and a ballot for every member, in a shuffled voting
/// order
pub fn arb_vote_order() -> impl Strategy<Value = (usize, Vec<(MemberId, Ballot)>)> {
    arb_member_count().prop_flat_map(|count| {
        proptest::collection::vec(arb_ballot(), count).prop_flat_map(move |ballots| {
            let votes: Vec<(MemberId, Ballot)> = ballots
                .into_iter()
                .enumerate()
                .map(|(i, ballot)| (MemberId(i as u64), ballot))
                .collect();
            Just(votes)
                .prop_shuffle()
                .prop_map(move |votes| (count, votes))
        })
    })
}

/// A committed history: the view each seqno committed in, non-decreasing
pub fn arb_committed_views() -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(0u64..=1, 1..12).prop_map(|bumps| {
        let mut view = 1;
        bumps
            .into_iter()
            .map(|bump| {
                view += bump;
                view
            })
            .collect()
    })
}
