//! # Contract and Message Signing
//!
//! Port definition for signing and verifying contract and message bytes.
//!
//! The engine treats signatures as opaque strings; what scheme backs them
//! is the implementation's concern. [`MockSigner`] is a deterministic
//! stand-in for tests.

use std::fmt;
use thiserror::Error;

/// Error type for signing operations.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The signing key is missing or unusable.
    #[error("key error: {0}")]
    Key(String),
}

/// Result type for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;

/// Trait for signing and verifying bytes.
pub trait ContractSigner: Send + Sync + fmt::Debug {
    /// The public key this signer signs under.
    fn pub_key(&self) -> &str;

    /// Signs the given bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is unusable.
    fn sign(&self, bytes: &[u8]) -> SigningResult<String>;

    /// Verifies a signature made by `pub_key` over `bytes`.
    fn verify(&self, pub_key: &str, bytes: &[u8], signature: &str) -> bool;
}

/// Deterministic test signer.
///
/// The "signature" is the signing key joined with a checksum of the bytes;
/// verification recomputes it. Worthless cryptographically, but it makes
/// signature-mismatch paths testable.
#[derive(Debug, Clone)]
pub struct MockSigner {
    key: String,
}

impl MockSigner {
    /// Creates a signer for the given key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn checksum(bytes: &[u8]) -> u64 {
        // FNV-1a, enough to pin the payload in tests.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

impl ContractSigner for MockSigner {
    fn pub_key(&self) -> &str {
        &self.key
    }

    fn sign(&self, bytes: &[u8]) -> SigningResult<String> {
        Ok(format!("{}:{:016x}", self.key, Self::checksum(bytes)))
    }

    fn verify(&self, pub_key: &str, bytes: &[u8], signature: &str) -> bool {
        signature == format!("{pub_key}:{:016x}", Self::checksum(bytes))
    }
}
