//! Consortium Testing Infrastructure
//!
//! Deterministic effect handlers, an in-process transport from member
//! clients to a node, and fixtures that stand up a genesis or recovering
//! network in one call.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use consortium_testkit::TestNetwork;
//!
//! # async fn run() {
//! let network = TestNetwork::recovering(3, 2);
//! let client = network.client(network.members[0].id);
//! client.accept_recovery().await.unwrap();
//! # }
//! ```

pub mod clock;
pub mod crypto;
pub mod effects;
pub mod fixtures;
pub mod ledger;
pub mod logging;
pub mod replica;
pub mod strategies;
pub mod transport;

pub use clock::ControllableClock;
pub use crypto::MockCrypto;
pub use effects::{MemberEffects, TestEffects};
pub use fixtures::{
    member_info, test_config, TestMember, TestNetwork, ARCHIVED_NETWORK_KEY, LEDGER_SECRET,
};
pub use ledger::MockLedger;
pub use logging::init_test_tracing;
pub use replica::ScriptedReplica;
pub use transport::{InProcessTransport, InjectedFailure, RecordedRequest};
