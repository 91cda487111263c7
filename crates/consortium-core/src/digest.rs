//! Chained state digest acknowledged by members
//!
//! Every governance mutation folds a description of the change into the
//! running digest. A member activates by acknowledging the digest it was
//! handed; any later mutation makes that acknowledgement stale.

use crate::errors::ConsortiumError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 32-byte SHA-256 chain value
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateDigest([u8; 32]);

impl StateDigest {
    /// Digest of the empty governance state
    pub fn genesis() -> Self {
        Self(Sha256::digest(b"consortium/genesis").into())
    }

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Next digest in the chain after applying `event`
    pub fn advance(&self, event: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update((event.len() as u64).to_le_bytes());
        hasher.update(event);
        Self(hasher.finalize().into())
    }

    /// Hex encoding of the digest
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", &self.to_hex()[..16])
    }
}

impl FromStr for StateDigest {
    type Err = ConsortiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| ConsortiumError::invalid(format!("malformed state digest: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConsortiumError::invalid("state digest must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for StateDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StateDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_deterministic_and_order_sensitive() {
        let g = StateDigest::genesis();
        assert_eq!(g.advance(b"a"), g.advance(b"a"));
        assert_ne!(g.advance(b"a").advance(b"b"), g.advance(b"b").advance(b"a"));
        assert_ne!(g.advance(b"a"), g);
    }

    #[test]
    fn test_hex_serde() {
        let d = StateDigest::genesis().advance(b"member added");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: StateDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_rejects_short_digest() {
        assert!("abcd".parse::<StateDigest>().is_err());
    }
}
