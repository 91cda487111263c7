//! Effect traits for the external capabilities the consortium core consumes
//!
//! The core never performs I/O, cryptography or clock reads directly. Each
//! capability is an async trait; production handlers wrap the real ledger,
//! signing keys and system clock, while `consortium-testkit` provides
//! deterministic implementations.
//!
//! - [`TransportEffects`]: request/response calls to a ledger node
//! - [`GovernanceReadEffects`]: reads of governance tables
//! - [`CryptoEffects`]: signing, share decryption, secret combination
//! - [`PhysicalTimeEffects`]: wall-clock reads and sleeping

pub mod crypto;
pub mod governance;
pub mod supertraits;
pub mod time;
pub mod transport;

pub use crypto::{CryptoEffects, CryptoError, DecryptedShare, RecoveredSecret};
pub use governance::GovernanceReadEffects;
pub use supertraits::{ClientEffects, ConsortiumEffects, NodeEffects};
pub use time::{PhysicalTime, PhysicalTimeEffects, RealTimeHandler, TimeError};
pub use transport::{TransportEffects, TransportError, TransportResponse};
