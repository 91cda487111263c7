//! # Consortium Governance
//!
//! Membership, proposals and quorum voting for a consortium-governed ledger.
//!
//! - [`MemberDirectory`]: member records and the root digest members acknowledge
//! - [`ProposalRegistry`]: proposals, ballots and the quorum rule
//! - [`Governance`]: the state container that enacts passed proposals
//!
//! All types here are plain state; callers provide locking.

pub mod directory;
pub mod governance;
pub mod member;
pub mod nodes;
pub mod proposal;
pub mod registry;

pub use directory::{ActiveSet, MemberDirectory};
pub use governance::{
    Enactment, Governance, ProposalUpdate, RecoveryGrant, ServiceState, ServiceStatus,
};
pub use member::{Member, MemberInfo, MemberStatus};
pub use nodes::{NodeStatus, NodeTable};
pub use proposal::{Ballot, Proposal, ProposalAction, ProposalState, ProposalSummary};
pub use registry::{quorum_threshold, ProposalRegistry, Tally};
