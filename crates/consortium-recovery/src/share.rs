//! Encrypted recovery shares as stored in the ledger and submitted by members

use consortium_core::MemberId;
use serde::{Deserialize, Serialize};

/// A member's recovery share, encrypted to that member's key by the
/// network key in force when the shares were issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// Member the share was issued to
    pub member_id: MemberId,
    /// Encrypted share bytes
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    /// Encryption nonce
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
}

/// Result of submitting one share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShareOutcome {
    /// Counted; more shares are needed
    Pending {
        /// Shares counted so far in this epoch
        submitted: usize,
        /// Shares needed
        threshold: usize,
    },
    /// This share completed the threshold and the secret was reconstructed
    Recovered {
        /// Recovery epoch that completed
        epoch: u64,
    },
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
