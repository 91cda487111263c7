//! Deterministic crypto capability
//!
//! Not cryptography. Signatures are keyed hashes, share encryption is an XOR
//! keystream derived from both key references and the nonce, and every share
//! carries a checksum so decrypting with the wrong key is detected. Each
//! dealt share holds the whole secret tagged with its index; combining checks
//! that enough distinct shares agree on it.

use async_trait::async_trait;
use consortium_core::{CryptoEffects, CryptoError, DecryptedShare, KeyRef, RecoveredSecret};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const CHECKSUM_LEN: usize = 4;

/// Deterministic [`CryptoEffects`] handler
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCrypto;

impl MockCrypto {
    /// New handler
    pub fn new() -> Self {
        Self
    }

    /// Signature [`CryptoEffects::sign`] produces for `key` over `payload`
    pub fn signature(key: &KeyRef, payload: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(b"consortium-testkit/sign");
        hasher.update(key.as_str().as_bytes());
        hasher.update(payload);
        hasher.finalize().to_vec()
    }

    /// Deal `count` plaintext shares of `secret`
    pub fn deal_shares(secret: &[u8], count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|index| encode_share(index as u8, secret))
            .collect()
    }

    /// Encrypt a plaintext share for `recipient` as `sender`
    pub fn encrypt_share(
        plaintext: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
        nonce: &[u8],
    ) -> Vec<u8> {
        apply_keystream(plaintext, recipient, sender, nonce)
    }
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(body);
    [digest[0], digest[1], digest[2], digest[3]]
}

fn encode_share(index: u8, secret: &[u8]) -> Vec<u8> {
    let mut share = Vec::with_capacity(1 + secret.len() + CHECKSUM_LEN);
    share.push(index);
    share.extend_from_slice(secret);
    let sum = checksum(&share);
    share.extend_from_slice(&sum);
    share
}

/// Index and secret of a well-formed share
fn decode_share(share: &[u8]) -> Option<(u8, &[u8])> {
    if share.len() < 1 + CHECKSUM_LEN {
        return None;
    }
    let (body, sum) = share.split_at(share.len() - CHECKSUM_LEN);
    if checksum(body).as_slice() != sum {
        return None;
    }
    Some((body[0], &body[1..]))
}

fn apply_keystream(data: &[u8], recipient: &KeyRef, sender: &KeyRef, nonce: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(data.len() + 32);
    let mut counter = 0u64;
    while stream.len() < data.len() {
        let mut hasher = Sha256::new();
        hasher.update(recipient.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(sender.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(nonce);
        hasher.update(counter.to_le_bytes());
        stream.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    data.iter().zip(stream).map(|(d, k)| d ^ k).collect()
}

#[async_trait]
impl CryptoEffects for MockCrypto {
    async fn sign(&self, key: &KeyRef, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::SigningFailed {
                reason: "empty signing key".to_string(),
            });
        }
        Ok(Self::signature(key, payload))
    }

    async fn decrypt_share(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
    ) -> Result<DecryptedShare, CryptoError> {
        let plaintext = apply_keystream(ciphertext, recipient, sender, nonce);
        if decode_share(&plaintext).is_none() {
            return Err(CryptoError::DecryptionFailed {
                reason: format!("share for {recipient} does not authenticate under {sender}"),
            });
        }
        Ok(DecryptedShare::new(plaintext))
    }

    async fn combine_shares(
        &self,
        shares: &[DecryptedShare],
        threshold: usize,
    ) -> Result<RecoveredSecret, CryptoError> {
        let failed = |reason: String| CryptoError::CombinationFailed { reason };
        if shares.len() < threshold {
            return Err(failed(format!(
                "{} shares given, {threshold} required",
                shares.len()
            )));
        }

        let mut indices = BTreeSet::new();
        let mut secret: Option<&[u8]> = None;
        for share in shares {
            let (index, value) = decode_share(share.as_bytes())
                .ok_or_else(|| failed("malformed share".to_string()))?;
            if !indices.insert(index) {
                return Err(failed(format!("share index {index} given twice")));
            }
            match secret {
                None => secret = Some(value),
                Some(existing) if existing == value => {}
                Some(_) => return Err(failed("shares disagree on the secret".to_string())),
            }
        }

        secret
            .map(|s| RecoveredSecret::new(s.to_vec()))
            .ok_or_else(|| failed("no shares given".to_string()))
    }
}
