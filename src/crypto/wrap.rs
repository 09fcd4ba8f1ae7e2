//! RSA wrapping of the session key.
//!
//! A public key wraps with RSA-OAEP (SHA-256) and the private key unwraps.
//! A private key wraps with the raw private-key operation over PKCS#1 v1.5
//! type-1 padding and the public key recovers the block. The second direction
//! proves who produced the session key but does not hide it from anyone
//! holding the public key.

use aes_gcm::aead::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, Pkcs1v15Sign, RsaPublicKey};
use sha2::Sha256;

use crate::error::{DecryptFailure, OtaError, Result};
use crate::keys::{KeyKind, KeyMaterial};

/// Minimum run of 0xFF bytes in a type-1 padding block.
const MIN_PADDING_LEN: usize = 8;

pub fn wrap(material: &KeyMaterial, session: &[u8]) -> Result<Vec<u8>> {
    match material.kind() {
        KeyKind::Public => {
            let key = material.to_public_key()?;
            key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), session)
                .map_err(|err| OtaError::EncryptionFailed(format!("wrap session key: {err}")))
        }
        KeyKind::Private => {
            let key = material.to_private_key()?;
            key.sign_with_rng(&mut OsRng, Pkcs1v15Sign::new_unprefixed(), session)
                .map_err(|err| OtaError::EncryptionFailed(format!("wrap session key: {err}")))
        }
    }
}

pub fn unwrap(material: &KeyMaterial, wrapped: &[u8]) -> Result<Vec<u8>> {
    match material.kind() {
        KeyKind::Private => {
            let key = material.to_private_key()?;
            key.decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| OtaError::DecryptionFailed(DecryptFailure::Unwrap))
        }
        KeyKind::Public => {
            let key = material.to_public_key()?;
            recover_type1(&key, wrapped).ok_or(OtaError::DecryptionFailed(DecryptFailure::Unwrap))
        }
    }
}

fn recover_type1(key: &RsaPublicKey, wrapped: &[u8]) -> Option<Vec<u8>> {
    let size = key.size();
    if wrapped.len() != size {
        return None;
    }

    let c = BigUint::from_bytes_be(wrapped);
    if &c >= key.n() {
        return None;
    }

    let m = c.modpow(key.e(), key.n()).to_bytes_be();
    if m.len() > size {
        return None;
    }
    let mut block = vec![0u8; size - m.len()];
    block.extend_from_slice(&m);

    // 00 01 FF..FF 00 || data
    if block.len() < 2 + MIN_PADDING_LEN + 1 || block[0] != 0x00 || block[1] != 0x01 {
        return None;
    }
    let rest = &block[2..];
    let separator = rest.iter().position(|&b| b != 0xFF)?;
    if separator < MIN_PADDING_LEN || rest[separator] != 0x00 {
        return None;
    }
    Some(rest[separator + 1..].to_vec())
}
