//! Bundle encryption.
//!
//! - [`envelope`]: AES-256-GCM payload encryption under a per-bundle session key
//! - [`wrap`]: RSA wrapping of that session key
//! - [`checksum`]: SHA-256 of the plaintext archive recorded with each upload

pub mod envelope;
pub mod wrap;

use sha2::{Digest, Sha256};

pub use envelope::{EncryptionEnvelope, SessionKey, decode, encode};

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
