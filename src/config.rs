use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OtaError, Result};
use crate::keys::{DEFAULT_KEY_BITS, DefaultKeyPaths};
use crate::retention::DEFAULT_KEEP;

pub const DEFAULT_API_URL: &str = "https://api.otaup.dev/v1";

/// Uploads larger than this many MiB get a download-size warning.
pub const DEFAULT_UPLOAD_ALERT_MB: u64 = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Load from an explicit file (`--config` or `OTAUP_CONFIG`), or else the
    /// global file overlaid with the project file, then apply `OTAUP_*`
    /// environment overrides.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("OTAUP_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_layer(&path)? {
                Some(layer) => config.merge_layer(layer),
                None => {
                    return Err(OtaError::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_layer(global);
            }
            if let Some(project) = Self::load_layer(&Self::project_path(project_root))? {
                config.merge_layer(project);
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    #[must_use]
    pub fn project_path(project_root: &Path) -> PathBuf {
        project_root.join(".otaup").join("config.toml")
    }

    fn load_global() -> Result<Option<ConfigLayer>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_layer(&dir.join("otaup").join("config.toml"))
    }

    fn load_layer(path: &Path) -> Result<Option<ConfigLayer>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| OtaError::Config(format!("read config {}: {err}", path.display())))?;
        let layer = toml::from_str(&raw)
            .map_err(|err| OtaError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(layer))
    }

    fn merge_layer(&mut self, layer: ConfigLayer) {
        if let Some(layer) = layer.api {
            self.api.merge(layer);
        }
        if let Some(layer) = layer.app {
            self.app.merge(layer);
        }
        if let Some(layer) = layer.keys {
            self.keys.merge(layer);
        }
        if let Some(layer) = layer.cleanup {
            self.cleanup.merge(layer);
        }
        if let Some(layer) = layer.upload {
            self.upload.merge(layer);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = env_string(&lookup, "OTAUP_API_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = env_string(&lookup, "OTAUP_API_KEY") {
            self.api.api_key = Some(value);
        }
        if let Some(value) = env_u64(&lookup, "OTAUP_API_TIMEOUT_SECONDS")? {
            self.api.timeout_seconds = value;
        }

        if let Some(value) = env_string(&lookup, "OTAUP_APP_ID") {
            self.app.app_id = Some(value);
        }

        if let Some(value) = env_string(&lookup, "OTAUP_PRIVATE_KEY_PATH") {
            self.keys.private_key_path = PathBuf::from(value);
        }
        if let Some(value) = env_string(&lookup, "OTAUP_PUBLIC_KEY_PATH") {
            self.keys.public_key_path = PathBuf::from(value);
        }
        if let Some(value) = env_usize(&lookup, "OTAUP_KEY_BITS")? {
            self.keys.bits = value;
        }

        if let Some(value) = env_usize(&lookup, "OTAUP_CLEANUP_KEEP")? {
            self.cleanup.keep = value;
        }

        if let Some(value) = env_u64(&lookup, "OTAUP_UPLOAD_ALERT_MB")? {
            self.upload.alert_mb = value;
        }

        Ok(())
    }

    /// App id from the command line, falling back to `app.app_id`.
    pub fn require_app_id(&self, cli_value: Option<&str>) -> Result<String> {
        cli_value
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| self.app.app_id.clone())
            .ok_or_else(|| OtaError::MissingConfig("app.app_id".to_string()))
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| OtaError::MissingConfig("api.api_key".to_string()))
    }

    #[must_use]
    pub fn default_key_paths(&self) -> DefaultKeyPaths {
        DefaultKeyPaths {
            private: self.keys.private_key_path.clone(),
            public: self.keys.public_key_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ApiConfig {
    fn merge(&mut self, layer: ApiLayer) {
        if let Some(value) = layer.base_url {
            self.base_url = value;
        }
        if let Some(value) = layer.api_key {
            self.api_key = Some(value);
        }
        if let Some(value) = layer.timeout_seconds {
            self.timeout_seconds = value;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_id: Option<String>,
}

impl AppConfig {
    fn merge(&mut self, layer: AppLayer) {
        if let Some(value) = layer.app_id {
            self.app_id = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Default private key file, relative to the project root.
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    /// Default public key file, relative to the project root.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,
    /// RSA modulus size for `key create`.
    #[serde(default = "default_key_bits")]
    pub bits: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            private_key_path: default_private_key_path(),
            public_key_path: default_public_key_path(),
            bits: default_key_bits(),
        }
    }
}

impl KeysConfig {
    fn merge(&mut self, layer: KeysLayer) {
        if let Some(value) = layer.private_key_path {
            self.private_key_path = value;
        }
        if let Some(value) = layer.public_key_path {
            self.public_key_path = value;
        }
        if let Some(value) = layer.bits {
            self.bits = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_keep")]
    pub keep: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
        }
    }
}

impl CleanupConfig {
    fn merge(&mut self, layer: CleanupLayer) {
        if let Some(value) = layer.keep {
            self.keep = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size in MiB above which `upload` warns about download time.
    #[serde(default = "default_alert_mb")]
    pub alert_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            alert_mb: default_alert_mb(),
        }
    }
}

impl UploadConfig {
    fn merge(&mut self, layer: UploadLayer) {
        if let Some(value) = layer.alert_mb {
            self.alert_mb = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigLayer {
    pub api: Option<ApiLayer>,
    pub app: Option<AppLayer>,
    pub keys: Option<KeysLayer>,
    pub cleanup: Option<CleanupLayer>,
    pub upload: Option<UploadLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiLayer {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AppLayer {
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KeysLayer {
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub bits: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CleanupLayer {
    pub keep: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UploadLayer {
    pub alert_mb: Option<u64>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout_seconds() -> u64 {
    30
}

fn default_private_key_path() -> PathBuf {
    DefaultKeyPaths::default().private
}

fn default_public_key_path() -> PathBuf {
    DefaultKeyPaths::default().public
}

const fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

const fn default_keep() -> usize {
    DEFAULT_KEEP
}

const fn default_alert_mb() -> u64 {
    DEFAULT_UPLOAD_ALERT_MB
}

fn env_string(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.is_empty())
}

fn env_u64(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match env_string(lookup, key) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|err| OtaError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}

fn env_usize(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match env_string(lookup, key) {
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|err| OtaError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
