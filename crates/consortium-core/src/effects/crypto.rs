//! Cryptographic capability: signing, share decryption, secret combination
//!
//! Primitives live outside the core. Key material is referenced through
//! [`KeyRef`]s; decrypted shares and the recovered secret are zeroized on drop.

use crate::identifiers::KeyRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Error type for cryptographic operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CryptoError {
    /// Signing failed or the key is unavailable
    #[error("Signing failed: {reason}")]
    SigningFailed {
        /// Failure description
        reason: String,
    },
    /// A share could not be decrypted with the given keys
    #[error("Share decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure description
        reason: String,
    },
    /// Shares did not combine into a secret
    #[error("Secret combination failed: {reason}")]
    CombinationFailed {
        /// Failure description
        reason: String,
    },
}

/// Plaintext recovery share
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DecryptedShare(Vec<u8>);

impl DecryptedShare {
    /// Wrap decrypted share bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the share bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DecryptedShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecryptedShare(<{} bytes>)", self.0.len())
    }
}

/// Reconstructed ledger secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RecoveredSecret(Vec<u8>);

impl RecoveredSecret {
    /// Wrap reconstructed secret bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the secret bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for RecoveredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecoveredSecret(<redacted>)")
    }
}

/// Cryptographic capability consumed by the core
#[async_trait]
pub trait CryptoEffects: Send + Sync {
    /// Sign `payload` with the key behind `key`
    async fn sign(&self, key: &KeyRef, payload: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a member's share using the member's private encryption key
    /// (`recipient`) and the sender's public key (`sender`)
    async fn decrypt_share(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
    ) -> Result<DecryptedShare, CryptoError>;

    /// Combine at least `threshold` decrypted shares into the secret
    async fn combine_shares(
        &self,
        shares: &[DecryptedShare],
        threshold: usize,
    ) -> Result<RecoveredSecret, CryptoError>;
}

#[async_trait]
impl<T: CryptoEffects + ?Sized> CryptoEffects for Arc<T> {
    async fn sign(&self, key: &KeyRef, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).sign(key, payload).await
    }

    async fn decrypt_share(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
    ) -> Result<DecryptedShare, CryptoError> {
        (**self)
            .decrypt_share(ciphertext, nonce, recipient, sender)
            .await
    }

    async fn combine_shares(
        &self,
        shares: &[DecryptedShare],
        threshold: usize,
    ) -> Result<RecoveredSecret, CryptoError> {
        (**self).combine_shares(shares, threshold).await
    }
}
