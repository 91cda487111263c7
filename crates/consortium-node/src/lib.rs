//! # Consortium Node
//!
//! [`ConsortiumNode`] owns one node's governance state and recovery
//! coordinator, exposes the member operations as methods, and dispatches
//! JSON requests arriving over a transport.

pub mod dispatch;
pub mod node;

pub use dispatch::{
    ops, AckParams, MemberParams, NodeParams, ProposalParams, ProposeParams, ShareParams,
    VoteParams,
};
pub use node::{ConsortiumNode, NETWORK_KEYS_TABLE, PREVIOUS_NETWORK_KEY};
