//! # Consortium Client
//!
//! [`MemberClient`] is one member's view of the consortium over a transport;
//! [`Orchestrator`] drives several of them through multi-member flows.

pub mod member;
pub mod orchestrator;

pub use consortium_commit::{cross_check, parse_history};
pub use member::{MemberClient, ShareSubmission, RECOVERY_SHARES_TABLE, TX_STATUS_OP};
pub use orchestrator::Orchestrator;
