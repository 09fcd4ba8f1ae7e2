//! Remote bundle service.
//!
//! [`BundleService`] is everything the commands need from the backend.
//! [`HttpBundleService`] speaks the JSON API; tests substitute in-memory
//! implementations.

mod http;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpBundleService;

/// Identifier the service assigns to a stored bundle version.
pub type VersionId = i64;

/// A bundle version as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVersion {
    pub id: VersionId,
    /// Semver version string.
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Wrapped session key of an encrypted bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// A channel and the version it currently serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub name: String,
    pub version_id: Option<VersionId>,
}

/// Metadata registered before the bundle bytes are uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionUpload {
    pub name: String,
    /// SHA-256 of the plaintext archive. Absent for external bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Where the app downloads an externally hosted bundle from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub size: u64,
}

pub trait BundleService {
    fn list_versions(&self, app_id: &str) -> Result<Vec<BundleVersion>>;

    fn list_channels(&self, app_id: &str) -> Result<Vec<ChannelRef>>;

    /// Ids of versions currently referenced by at least one channel.
    fn list_in_use_version_ids(&self, app_id: &str) -> Result<HashSet<VersionId>> {
        Ok(self
            .list_channels(app_id)?
            .into_iter()
            .filter_map(|channel| channel.version_id)
            .collect())
    }

    fn delete_version(&self, app_id: &str, version_name: &str) -> Result<()>;

    /// Register `metadata`, then upload `bundle` when given. `None` registers
    /// an externally hosted version only.
    fn upload_version(
        &self,
        app_id: &str,
        metadata: &VersionUpload,
        bundle: Option<&[u8]>,
    ) -> Result<BundleVersion>;

    fn set_channel(&self, app_id: &str, channel: &str, version_name: &str) -> Result<()>;
}
