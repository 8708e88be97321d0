//! Budget Engine Cryptography
//!
//! Vote signing, signature verification, and content hashing

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// Voting key pair for a masternode
#[derive(Clone)]
pub struct VotingKey {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl VotingKey {
    /// Generate new random voting key
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Restore a voting key from its secret hex
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str).map_err(|_| CryptoError::InvalidPrivateKey)?;

        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPrivateKey)?;

        let signing_key = SigningKey::from_bytes(&key_bytes);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Public key as hex string (the voter's identity key)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Secret key as hex string
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a canonical message, returning a hex-encoded detached signature
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Verify a hex-encoded signature against a hex-encoded public key
pub fn verify_hex(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), CryptoError> {
    let pub_key_bytes = hex::decode(public_key_hex).map_err(|_| CryptoError::InvalidPublicKey)?;

    let pub_key_array: [u8; 32] = pub_key_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let verifying_key =
        VerifyingKey::from_bytes(&pub_key_array).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig_bytes = hex::decode(signature_hex).map_err(|_| CryptoError::InvalidSignature)?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;

    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// SHA-256 content hash of canonical bytes, as a hex string
///
/// Used for proposal and finalized-budget identity. Every field that is
/// part of the identity must be fed through `update` calls in a fixed
/// order by the caller.
pub fn content_hash(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
