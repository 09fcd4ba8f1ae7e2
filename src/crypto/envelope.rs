//! Hybrid envelope codec for bundle archives.
//!
//! Each encode draws a new AES-256-GCM session key and nonce, encrypts the
//! archive with them and wraps `key || nonce` with RSA. The wrapped session
//! key travels beside the payload, never inside it:
//!
//! ```text
//! payload             = AES-256-GCM(key, nonce, archive)   (ciphertext || tag)
//! session_key_wrapped = base64(RSA-wrap(key || nonce))
//! ```
//!
//! A payload whose wrapped session key is lost cannot be decrypted by anyone.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::wrap;
use crate::error::{DecryptFailure, OtaError, Result};
use crate::keys::{KeyMaterial, KeyRole, KeyStrategy};

/// AES-256 key size in bytes.
pub const SESSION_KEY_SIZE: usize = 32;
/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Output of [`encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    /// Base64 of the RSA-wrapped session key. Required for decoding.
    pub session_key_wrapped: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

/// Ephemeral AES key plus nonce for a single envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl SessionKey {
    pub const LEN: usize = SESSION_KEY_SIZE + NONCE_SIZE;

    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut session = Self {
            key: [0; SESSION_KEY_SIZE],
            nonce: [0; NONCE_SIZE],
        };
        session.key.copy_from_slice(&key);
        session.nonce.copy_from_slice(&nonce);
        session
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.nonce);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let (key_bytes, nonce_bytes) = bytes.split_at(SESSION_KEY_SIZE);
        let mut session = Self {
            key: [0; SESSION_KEY_SIZE],
            nonce: [0; NONCE_SIZE],
        };
        session.key.copy_from_slice(key_bytes);
        session.nonce.copy_from_slice(nonce_bytes);
        Some(session)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|_| OtaError::EncryptionFailed("payload encryption".to_string()))
    }

    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext)
            .map_err(|_| OtaError::DecryptionFailed(DecryptFailure::Payload))
    }
}

/// Encrypt `archive` for the app using the strategy's encode-role key.
pub fn encode(
    archive: &[u8],
    key: &KeyMaterial,
    strategy: KeyStrategy,
) -> Result<EncryptionEnvelope> {
    ensure_role(key, strategy, KeyRole::Encode)?;

    let session = SessionKey::generate();
    let payload = session.seal(archive)?;
    let wrapped = wrap::wrap(key, &session.to_bytes())?;

    debug!(
        %strategy,
        archive_len = archive.len(),
        payload_len = payload.len(),
        "archive encrypted"
    );

    Ok(EncryptionEnvelope {
        session_key_wrapped: STANDARD.encode(wrapped),
        payload,
    })
}

/// Decrypt a payload produced by [`encode`] with the strategy's decode-role key.
///
/// Every failure, a key of the wrong kind included, is reported as the same
/// [`OtaError::DecryptionFailed`]; the stage is only logged.
pub fn decode(
    payload: &[u8],
    session_key_wrapped: &str,
    key: &KeyMaterial,
    strategy: KeyStrategy,
) -> Result<Vec<u8>> {
    ensure_role(key, strategy, KeyRole::Decode)
        .map_err(|_| OtaError::DecryptionFailed(DecryptFailure::KeyKind))
        .and_then(|()| decode_inner(payload, session_key_wrapped, key))
        .inspect_err(|err| {
            if let OtaError::DecryptionFailed(stage) = err {
                debug!(%stage, %strategy, key_kind = %key.kind(), "decode rejected");
            }
        })
}

fn decode_inner(payload: &[u8], session_key_wrapped: &str, key: &KeyMaterial) -> Result<Vec<u8>> {
    let wrapped = STANDARD
        .decode(session_key_wrapped.trim())
        .map_err(|_| OtaError::DecryptionFailed(DecryptFailure::MalformedSessionKey))?;

    let session_bytes = wrap::unwrap(key, &wrapped)?;
    let session = SessionKey::from_bytes(&session_bytes)
        .ok_or(OtaError::DecryptionFailed(DecryptFailure::Unwrap))?;

    session.open(payload)
}

fn ensure_role(key: &KeyMaterial, strategy: KeyStrategy, role: KeyRole) -> Result<()> {
    let expected = strategy.kind_for(role);
    if key.kind() == expected {
        Ok(())
    } else {
        Err(OtaError::KeyKindMismatch {
            expected,
            found: Some(key.kind()),
            source_desc: format!("the {role} key"),
        })
    }
}
