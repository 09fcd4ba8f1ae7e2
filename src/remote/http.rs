use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{BundleService, BundleVersion, ChannelRef, VersionUpload};
use crate::error::{OtaError, Result};

const USER_AGENT: &str = concat!("otaup/", env!("CARGO_PKG_VERSION"));

/// [`BundleService`] over the service's JSON API.
pub struct HttpBundleService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpBundleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBundleService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChannelAssignment<'a> {
    version: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

impl HttpBundleService {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        if base_url.starts_with("http://") {
            tracing::warn!("bundle service URL uses unencrypted HTTP; the API key is sent in plain text");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| OtaError::Network(format!("http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn app_url(&self, app_id: &str, rest: &str) -> String {
        format!(
            "{}/apps/{}{rest}",
            self.base_url,
            urlencoding::encode(app_id)
        )
    }

    fn send(&self, request: RequestBuilder, label: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|err| OtaError::Network(format!("{label}: {err}")))?;
        debug!(label, status = %response.status(), "bundle service response");
        check_status(response, label)
    }
}

fn check_status(response: Response, label: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<ErrorBody>()
        .map(|body| format!(": {}", body.message))
        .unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        Err(OtaError::NotFound(format!("{label} (HTTP {status}){detail}")))
    } else {
        Err(OtaError::Remote(format!("{label} failed: HTTP {status}{detail}")))
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(response: Response, label: &str) -> Result<T> {
    response
        .json::<T>()
        .map_err(|err| OtaError::Remote(format!("{label} parse failed: {err}")))
}

impl BundleService for HttpBundleService {
    fn list_versions(&self, app_id: &str) -> Result<Vec<BundleVersion>> {
        let url = self.app_url(app_id, "/versions");
        let response = self.send(self.client.get(url), "list versions")?;
        parse_json(response, "list versions")
    }

    fn list_channels(&self, app_id: &str) -> Result<Vec<ChannelRef>> {
        let url = self.app_url(app_id, "/channels");
        let response = self.send(self.client.get(url), "list channels")?;
        parse_json(response, "list channels")
    }

    fn delete_version(&self, app_id: &str, version_name: &str) -> Result<()> {
        let url = self.app_url(
            app_id,
            &format!("/versions/{}", urlencoding::encode(version_name)),
        );
        self.send(self.client.delete(url), "delete version")?;
        info!(app_id, version = version_name, "version deleted");
        Ok(())
    }

    fn upload_version(
        &self,
        app_id: &str,
        metadata: &VersionUpload,
        bundle: Option<&[u8]>,
    ) -> Result<BundleVersion> {
        let url = self.app_url(app_id, "/versions");
        let response = self.send(self.client.post(url).json(metadata), "register version")?;
        let version: BundleVersion = parse_json(response, "register version")?;

        let Some(bundle) = bundle else {
            info!(app_id, version = %metadata.name, "external version registered");
            return Ok(version);
        };

        let url = self.app_url(
            app_id,
            &format!("/versions/{}/bundle", urlencoding::encode(&metadata.name)),
        );
        self.send(
            self.client
                .put(url)
                .header("Content-Type", "application/octet-stream")
                .body(bundle.to_vec()),
            "upload bundle",
        )?;

        info!(app_id, version = %metadata.name, bytes = bundle.len(), "bundle uploaded");
        Ok(version)
    }

    fn set_channel(&self, app_id: &str, channel: &str, version_name: &str) -> Result<()> {
        let url = self.app_url(app_id, &format!("/channels/{}", urlencoding::encode(channel)));
        self.send(
            self.client.put(url).json(&ChannelAssignment {
                version: version_name,
            }),
            "set channel",
        )?;
        info!(app_id, channel, version = version_name, "channel updated");
        Ok(())
    }
}
