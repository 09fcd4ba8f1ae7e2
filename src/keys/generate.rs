//! `key create` and `key save`.
//!
//! Neither operation touches the strategy store. Both hand back a
//! [`ConfigPatch`] that the caller applies.

use std::path::PathBuf;

use aes_gcm::aead::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info};

use super::{
    ConfigPatch, DecryptStrategy, DefaultKeyPaths, KeyFileStore, KeyKind, KeyMaterial,
    KeyRequest, KeyResolver, KeyRole, KeyStrategy,
};
use crate::error::{OtaError, Result};

/// Smallest modulus that still fits an OAEP-SHA256 wrapped session key.
pub const MIN_KEY_BITS: usize = 1024;
pub const DEFAULT_KEY_BITS: usize = 2048;

/// A freshly generated RSA key pair in PEM form.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private: KeyMaterial,
    pub public: KeyMaterial,
}

impl KeyPair {
    #[must_use]
    pub const fn of_kind(&self, kind: KeyKind) -> &KeyMaterial {
        match kind {
            KeyKind::Private => &self.private,
            KeyKind::Public => &self.public,
        }
    }
}

pub fn create_key_pair(bits: usize) -> Result<KeyPair> {
    if bits < MIN_KEY_BITS {
        return Err(OtaError::ValidationFailed(format!(
            "key size {bits} is below the minimum of {MIN_KEY_BITS} bits"
        )));
    }

    debug!(bits, "generating RSA key pair");
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|err| OtaError::InvalidKey(format!("generate key pair: {err}")))?;
    let public = RsaPublicKey::from(&private);

    Ok(KeyPair {
        private: KeyMaterial::from_private_key(&private)?,
        public: KeyMaterial::from_public_key(&public)?,
    })
}

/// Result of `key create`.
#[derive(Debug, Clone)]
pub struct KeyCreation {
    pub patch: ConfigPatch,
    pub strategy: KeyStrategy,
    /// Files written, private key first.
    pub written: Vec<PathBuf>,
}

/// Options for [`create_keys`].
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions<'a> {
    pub app_id: &'a str,
    /// Decode kind chosen on the command line, overriding the persisted one.
    pub strategy_override: Option<KeyKind>,
    pub force: bool,
    pub bits: usize,
}

/// Generate a key pair, write both default key files and return the patch
/// that records the decode-role key for the app.
///
/// Both files are checked before anything is written, so a refusal leaves
/// the project untouched.
pub fn create_keys<S: KeyFileStore>(
    files: &mut S,
    defaults: &DefaultKeyPaths,
    current: Option<&DecryptStrategy>,
    options: CreateOptions<'_>,
) -> Result<KeyCreation> {
    let decode_kind = options
        .strategy_override
        .or_else(|| current.map(|strategy| strategy.kind))
        .unwrap_or(KeyStrategy::PrivateDecrypt.decode_kind());
    let strategy = KeyStrategy::from_decode_kind(decode_kind);

    if !options.force {
        for path in [&defaults.private, &defaults.public] {
            if files.exists(path) {
                return Err(OtaError::AlreadyExists(format!(
                    "key file {} (use --force to overwrite)",
                    path.display()
                )));
            }
        }
    }

    let pair = create_key_pair(options.bits)?;

    let mut written = Vec::with_capacity(2);
    for kind in [KeyKind::Private, KeyKind::Public] {
        let path = defaults.for_kind(kind);
        files.write(path, pair.of_kind(kind).pem().as_bytes(), kind)?;
        written.push(path.to_path_buf());
    }

    info!(
        app_id = options.app_id,
        %strategy,
        "created key pair"
    );

    let decode_key = pair.of_kind(strategy.decode_kind());
    Ok(KeyCreation {
        patch: ConfigPatch {
            app_id: options.app_id.to_string(),
            strategy: DecryptStrategy {
                kind: strategy.decode_kind(),
                key: Some(decode_key.pem().to_string()),
            },
        },
        strategy,
        written,
    })
}

/// Validate the decode-role key for the app and return the patch that
/// stores it.
///
/// The currently stored key is ignored so that `key save` always reads from
/// the request or the default key file.
pub fn save_key<S: KeyFileStore>(
    resolver: &KeyResolver<'_, S>,
    current: Option<&DecryptStrategy>,
    request: &KeyRequest<'_>,
    app_id: &str,
) -> Result<ConfigPatch> {
    let base = current.map_or_else(
        || DecryptStrategy::new(KeyStrategy::default().decode_kind()),
        DecryptStrategy::without_key,
    );
    let resolved = resolver.resolve(Some(&base), KeyRole::Decode, request)?;

    // Parse the PEM body too, not just the header
    match resolved.material.kind() {
        KeyKind::Private => {
            resolved.material.to_private_key()?;
        }
        KeyKind::Public => {
            resolved.material.to_public_key()?;
        }
    }

    info!(app_id, source = %resolved.source, kind = %resolved.material.kind(), "decode key validated");

    Ok(ConfigPatch {
        app_id: app_id.to_string(),
        strategy: DecryptStrategy {
            kind: resolved.material.kind(),
            key: Some(resolved.material.pem().to_string()),
        },
    })
}
