//! Resolve the key material for one encode or decode invocation.
//!
//! Resolution order, first match wins:
//! 1. inline key data (`--key-data`)
//! 2. an explicit key path (`--key`), which must exist
//! 3. the stored strategy key (decode role only), then the default key file
//!    for the kind the role requires
//!
//! Whatever is found must carry the PEM header of the kind the strategy
//! assigns to the role.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::store::write_owner_only;
use super::{DecryptStrategy, KeyKind, KeyMaterial, KeyRole, KeyStrategy};
use crate::error::{OtaError, Result};

/// Filesystem access for key files.
pub trait KeyFileStore {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&mut self, path: &Path, bytes: &[u8], kind: KeyKind) -> Result<()>;
}

/// [`KeyFileStore`] rooted at the project directory.
///
/// Relative paths are resolved against the root, absolute paths are used as is.
#[derive(Debug, Clone)]
pub struct FsKeyStore {
    root: PathBuf,
}

impl FsKeyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl KeyFileStore for FsKeyStore {
    fn exists(&self, path: &Path) -> bool {
        self.full_path(path).is_file()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        fs::read(&full).map_err(OtaError::from)
    }

    fn write(&mut self, path: &Path, bytes: &[u8], kind: KeyKind) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        match kind {
            KeyKind::Private => write_owner_only(&full, bytes),
            KeyKind::Public => fs::write(&full, bytes).map_err(OtaError::from),
        }
    }
}

/// The two conventional key file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultKeyPaths {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl Default for DefaultKeyPaths {
    fn default() -> Self {
        Self {
            private: PathBuf::from(".otaup_key"),
            public: PathBuf::from(".otaup_key.pub"),
        }
    }
}

impl DefaultKeyPaths {
    #[must_use]
    pub fn for_kind(&self, kind: KeyKind) -> &Path {
        match kind {
            KeyKind::Private => &self.private,
            KeyKind::Public => &self.public,
        }
    }
}

/// Explicit key options from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyRequest<'a> {
    pub key_data: Option<&'a str>,
    pub key_path: Option<&'a Path>,
}

/// Where a resolved key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Inline,
    ExplicitPath(PathBuf),
    StoredStrategy,
    DefaultPath(PathBuf),
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "--key-data"),
            Self::ExplicitPath(path) => write!(f, "--key {}", path.display()),
            Self::StoredStrategy => write!(f, "stored decrypt strategy"),
            Self::DefaultPath(path) => write!(f, "default key file {}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub strategy: KeyStrategy,
    pub role: KeyRole,
    pub material: KeyMaterial,
    pub source: KeySource,
}

pub struct KeyResolver<'a, S: KeyFileStore> {
    files: &'a S,
    defaults: &'a DefaultKeyPaths,
}

impl<'a, S: KeyFileStore> KeyResolver<'a, S> {
    pub const fn new(files: &'a S, defaults: &'a DefaultKeyPaths) -> Self {
        Self { files, defaults }
    }

    /// Resolve the key for `role` under the persisted strategy.
    ///
    /// An absent strategy behaves like the default private-decrypt strategy.
    pub fn resolve(
        &self,
        persisted: Option<&DecryptStrategy>,
        role: KeyRole,
        request: &KeyRequest<'_>,
    ) -> Result<ResolvedKey> {
        let strategy = persisted.map(DecryptStrategy::strategy).unwrap_or_default();
        let kind = strategy.kind_for(role);
        debug!(%strategy, %role, %kind, "resolving key");

        let (pem, source) = self.locate(persisted, role, kind, request)?;
        let material = KeyMaterial::parse(kind, pem, &source.to_string())?;
        debug!(%source, "key resolved");

        Ok(ResolvedKey {
            strategy,
            role,
            material,
            source,
        })
    }

    fn locate(
        &self,
        persisted: Option<&DecryptStrategy>,
        role: KeyRole,
        kind: KeyKind,
        request: &KeyRequest<'_>,
    ) -> Result<(String, KeySource)> {
        if let Some(data) = request.key_data.filter(|data| !data.is_empty()) {
            return Ok((data.to_string(), KeySource::Inline));
        }

        if let Some(path) = request.key_path {
            if !self.files.exists(path) {
                return Err(OtaError::KeyNotFound {
                    kind,
                    checked: vec![KeySource::ExplicitPath(path.to_path_buf()).to_string()],
                });
            }
            let pem = self.read_pem(path)?;
            return Ok((pem, KeySource::ExplicitPath(path.to_path_buf())));
        }

        let mut checked = vec!["--key-data".to_string(), "--key".to_string()];

        if role == KeyRole::Decode {
            let stored = persisted
                .and_then(|strategy| strategy.key.as_deref())
                .filter(|key| !key.is_empty());
            if let Some(key) = stored {
                return Ok((key.to_string(), KeySource::StoredStrategy));
            }
            checked.push(KeySource::StoredStrategy.to_string());
        }

        let default_path = self.defaults.for_kind(kind);
        if self.files.exists(default_path) {
            let pem = self.read_pem(default_path)?;
            return Ok((pem, KeySource::DefaultPath(default_path.to_path_buf())));
        }
        checked.push(KeySource::DefaultPath(default_path.to_path_buf()).to_string());

        Err(OtaError::KeyNotFound { kind, checked })
    }

    fn read_pem(&self, path: &Path) -> Result<String> {
        let bytes = self.files.read(path)?;
        String::from_utf8(bytes).map_err(|_| {
            OtaError::InvalidKey(format!("{} is not UTF-8 PEM text", path.display()))
        })
    }
}
