//! otaup upload - Upload a bundle version
//!
//! The archive is encrypted whenever an encode key resolves. Without one,
//! and with no key option given, the bundle goes up unencrypted.
//!
//! `--external <url>` registers a version hosted elsewhere: only metadata is
//! sent, with the session key from `--iv-session-key` if the hosted bundle is
//! encrypted.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serde_json::json;

use super::encrypt::{SESSION_KEY_WARNING, print_session_key, resolve_encode_key};
use super::{KeyOptions, input_archive};
use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::crypto::{self, EncryptionEnvelope};
use crate::error::{OtaError, Result};
use crate::keys::ResolvedKey;
use crate::remote::{BundleService, VersionUpload};

const UNENCRYPTED_WARNING: &str = "The bundle was uploaded unencrypted";

const MIB: u64 = 1024 * 1024;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Bundle zip to upload
    #[arg(long, value_name = "ZIP", required_unless_present = "external")]
    pub path: Option<PathBuf>,

    /// Version name (semver)
    #[arg(long, value_name = "VERSION")]
    pub bundle: String,

    /// Point this channel at the uploaded version
    #[arg(long)]
    pub channel: Option<String>,

    /// Register a bundle hosted at this https URL instead of uploading one
    #[arg(long, value_name = "URL", conflicts_with_all = ["path", "no_key", "key", "key_data"])]
    pub external: Option<String>,

    /// Session key of an encrypted external bundle
    #[arg(long, value_name = "SESSION_KEY", requires = "external")]
    pub iv_session_key: Option<String>,

    /// Upload without encrypting
    #[arg(long, conflicts_with_all = ["key", "key_data"])]
    pub no_key: bool,

    #[command(flatten)]
    pub key: KeyOptions,

    /// Print the session key in human output
    #[arg(long)]
    pub display_session_key: bool,
}

/// What will be sent for one upload.
#[derive(Debug)]
struct PreparedBundle {
    metadata: VersionUpload,
    /// `None` for external bundles.
    body: Option<Vec<u8>>,
    envelope: Option<EncryptionEnvelope>,
    key: Option<ResolvedKey>,
}

impl PreparedBundle {
    const fn is_external(&self) -> bool {
        self.body.is_none()
    }

    const fn is_encrypted(&self) -> bool {
        self.metadata.session_key.is_some()
    }
}

pub fn run(ctx: &AppContext, args: &UploadArgs) -> Result<()> {
    let app_id = ctx.require_app_id(None)?;
    semver::Version::parse(&args.bundle).map_err(|err| {
        OtaError::ValidationFailed(format!("--bundle {} is not semver: {err}", args.bundle))
    })?;

    let prepared = match (&args.external, &args.path) {
        (Some(url), _) => prepare_external(&args.bundle, url, args.iv_session_key.clone())?,
        (None, Some(path)) => {
            let input = input_archive(ctx, path)?;
            let archive = fs::read(&input)?;
            let key = if args.no_key {
                None
            } else {
                encode_key(ctx, &args.key)?
            };
            prepare(&args.bundle, archive, key)?
        }
        (None, None) => {
            return Err(OtaError::ValidationFailed(
                "--path or --external is required".to_string(),
            ));
        }
    };

    let service = ctx.bundle_service()?;
    run_with_service(ctx, args, &service, &app_id, prepared)
}

/// `None` only when nothing resolves and no key option was given.
fn encode_key(ctx: &AppContext, options: &KeyOptions) -> Result<Option<ResolvedKey>> {
    match resolve_encode_key(ctx, options) {
        Ok(resolved) => Ok(Some(resolved)),
        Err(OtaError::KeyNotFound { .. }) if !options.is_explicit() => {
            tracing::warn!("no encode key found, uploading unencrypted");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn prepare(name: &str, archive: Vec<u8>, key: Option<ResolvedKey>) -> Result<PreparedBundle> {
    let checksum = crypto::checksum(&archive);
    let envelope = key
        .as_ref()
        .map(|key| crypto::encode(&archive, &key.material, key.strategy))
        .transpose()?;
    let body = match &envelope {
        Some(envelope) => envelope.payload.clone(),
        None => archive,
    };

    Ok(PreparedBundle {
        metadata: VersionUpload {
            name: name.to_string(),
            checksum: Some(checksum),
            session_key: envelope.as_ref().map(|e| e.session_key_wrapped.clone()),
            external_url: None,
            size: body.len() as u64,
        },
        body: Some(body),
        envelope,
        key,
    })
}

fn prepare_external(name: &str, url: &str, session_key: Option<String>) -> Result<PreparedBundle> {
    if !url.starts_with("https://") {
        return Err(OtaError::ValidationFailed(format!(
            "--external must start with https://, got {url}"
        )));
    }

    Ok(PreparedBundle {
        metadata: VersionUpload {
            name: name.to_string(),
            checksum: None,
            session_key: session_key.filter(|key| !key.trim().is_empty()),
            external_url: Some(url.to_string()),
            size: 0,
        },
        body: None,
        envelope: None,
        key: None,
    })
}

/// Warning for bundles whose whole-MiB size exceeds `alert_mb`.
fn size_warning(size: u64, alert_mb: u64) -> Option<String> {
    let mb = size / MIB;
    (mb > alert_mb).then(|| {
        format!("Bundle is {mb} MiB (alert size {alert_mb} MiB); it may take a while for users to download")
    })
}

fn run_with_service<S: BundleService>(
    ctx: &AppContext,
    args: &UploadArgs,
    service: &S,
    app_id: &str,
    prepared: PreparedBundle,
) -> Result<()> {
    let size_alert = size_warning(prepared.metadata.size, ctx.config.upload.alert_mb);
    if let Some(alert) = &size_alert {
        tracing::warn!(app_id, size = prepared.metadata.size, "{alert}");
    }

    let version = service.upload_version(app_id, &prepared.metadata, prepared.body.as_deref())?;
    if let Some(channel) = &args.channel {
        service.set_channel(app_id, channel, &version.name)?;
    }

    let mut warnings: Vec<String> = size_alert.iter().cloned().collect();
    if prepared.envelope.is_some() {
        warnings.push(SESSION_KEY_WARNING.to_string());
    } else if !prepared.is_external() {
        warnings.push(UNENCRYPTED_WARNING.to_string());
    }

    if ctx.robot_mode {
        let response = robot_ok(json!({
            "app_id": app_id,
            "version": version,
            "channel": args.channel,
            "external_url": prepared.metadata.external_url,
            "encrypted": prepared.is_encrypted(),
            "strategy": prepared.key.as_ref().map(|k| k.strategy.to_string()),
            "checksum": prepared.metadata.checksum,
            "session_key": prepared.metadata.session_key,
            "size": prepared.metadata.size,
        }));
        return emit_json(&warnings.into_iter().fold(response, |response, warning| {
            response.with_warning(warning)
        }));
    }

    match (&prepared.envelope, &prepared.key) {
        (Some(envelope), Some(key)) => {
            println!(
                "{} encrypted with the {} key from {}",
                "→".cyan(),
                key.material.kind(),
                key.source
            );
            if args.display_session_key {
                print_session_key(envelope);
            }
        }
        _ if prepared.is_external() => {}
        _ => println!("{} {}", "Warning:".yellow(), UNENCRYPTED_WARNING),
    }
    if let Some(alert) = &size_alert {
        println!("{} {}", "Warning:".yellow(), alert);
    }

    match &prepared.metadata.external_url {
        Some(url) => println!(
            "{} Registered {} at {}",
            "✓".green(),
            version.name.bold(),
            url
        ),
        None => println!(
            "{} Uploaded {} ({} bytes)",
            "✓".green(),
            version.name.bold(),
            prepared.metadata.size
        ),
    }
    if let Some(checksum) = &prepared.metadata.checksum {
        println!("  checksum {}", checksum.dimmed());
    }
    if let Some(channel) = &args.channel {
        println!("  channel {} → {}", channel.cyan(), version.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::Utc;

    use super::*;
    use crate::config::Config;
    use crate::keys::generate::test_keys;
    use crate::keys::{KeyRole, KeySource, KeyStrategy};
    use crate::remote::{BundleVersion, ChannelRef};

    #[derive(Default)]
    struct RecordingService {
        uploads: RefCell<Vec<(VersionUpload, Option<Vec<u8>>)>>,
        channels: RefCell<Vec<(String, String)>>,
    }

    impl BundleService for RecordingService {
        fn list_versions(&self, _: &str) -> Result<Vec<BundleVersion>> {
            Ok(Vec::new())
        }

        fn list_channels(&self, _: &str) -> Result<Vec<ChannelRef>> {
            Ok(Vec::new())
        }

        fn delete_version(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        fn upload_version(
            &self,
            _: &str,
            metadata: &VersionUpload,
            bundle: Option<&[u8]>,
        ) -> Result<BundleVersion> {
            self.uploads
                .borrow_mut()
                .push((metadata.clone(), bundle.map(<[u8]>::to_vec)));
            Ok(BundleVersion {
                id: 7,
                name: metadata.name.clone(),
                created_at: Utc::now(),
                checksum: metadata.checksum.clone(),
                session_key: metadata.session_key.clone(),
            })
        }

        fn set_channel(&self, _: &str, channel: &str, version_name: &str) -> Result<()> {
            self.channels
                .borrow_mut()
                .push((channel.to_string(), version_name.to_string()));
            Ok(())
        }
    }

    fn context() -> AppContext {
        AppContext {
            root: std::env::temp_dir(),
            config: Config::default(),
            robot_mode: true,
            app_id: Some("app".into()),
        }
    }

    fn args(channel: Option<&str>) -> UploadArgs {
        UploadArgs {
            path: Some(PathBuf::from("bundle.zip")),
            bundle: "1.2.3".into(),
            channel: channel.map(String::from),
            external: None,
            iv_session_key: None,
            no_key: false,
            key: KeyOptions::default(),
            display_session_key: false,
        }
    }

    fn encode_key() -> ResolvedKey {
        ResolvedKey {
            strategy: KeyStrategy::PrivateDecrypt,
            role: KeyRole::Encode,
            material: test_keys::pair().public.clone(),
            source: KeySource::Inline,
        }
    }

    // =========================================================================
    // prepare
    // =========================================================================

    #[test]
    fn unencrypted_bundle_is_sent_as_is() {
        let archive = b"PK\x03\x04 plain".to_vec();
        let prepared = prepare("1.2.3", archive.clone(), None).unwrap();

        assert_eq!(prepared.body.as_deref(), Some(archive.as_slice()));
        assert!(prepared.metadata.session_key.is_none());
        assert_eq!(prepared.metadata.checksum, Some(crypto::checksum(&archive)));
        assert_eq!(prepared.metadata.size, archive.len() as u64);
    }

    #[test]
    fn encrypted_bundle_checksums_the_plaintext() {
        let archive = b"PK\x03\x04 secret".to_vec();
        let prepared = prepare("1.2.3", archive.clone(), Some(encode_key())).unwrap();
        let body = prepared.body.clone().unwrap();

        assert_ne!(body, archive);
        assert_eq!(prepared.metadata.checksum, Some(crypto::checksum(&archive)));
        assert_eq!(prepared.metadata.size, body.len() as u64);

        let session_key = prepared.metadata.session_key.unwrap();
        let decoded = crypto::decode(
            &body,
            &session_key,
            &test_keys::pair().private,
            KeyStrategy::PrivateDecrypt,
        )
        .unwrap();
        assert_eq!(decoded, archive);
    }

    // =========================================================================
    // External bundles
    // =========================================================================

    #[test]
    fn external_url_must_be_https() {
        for url in ["http://cdn.example.com/b.zip", "cdn.example.com/b.zip", "ftp://x"] {
            let err = prepare_external("1.2.3", url, None).unwrap_err();
            assert!(matches!(err, OtaError::ValidationFailed(_)), "{url}");
        }
    }

    #[test]
    fn external_bundle_carries_url_and_session_key() {
        let prepared =
            prepare_external("1.2.3", "https://cdn.example.com/b.zip", Some("wrapped".into()))
                .unwrap();

        assert!(prepared.is_external());
        assert!(prepared.is_encrypted());
        assert!(prepared.metadata.checksum.is_none());
        assert_eq!(
            prepared.metadata.external_url.as_deref(),
            Some("https://cdn.example.com/b.zip")
        );
    }

    #[test]
    fn external_upload_sends_metadata_only() {
        let service = RecordingService::default();
        let prepared =
            prepare_external("1.2.3", "https://cdn.example.com/b.zip", None).unwrap();
        run_with_service(&context(), &args(Some("beta")), &service, "app", prepared).unwrap();

        let uploads = service.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].1.is_none());
        assert_eq!(
            uploads[0].0.external_url.as_deref(),
            Some("https://cdn.example.com/b.zip")
        );
        assert_eq!(
            *service.channels.borrow(),
            vec![("beta".to_string(), "1.2.3".to_string())]
        );
    }

    // =========================================================================
    // Size alert
    // =========================================================================

    #[test]
    fn size_alert_uses_whole_mebibytes() {
        assert!(size_warning(20 * MIB, 20).is_none());
        assert!(size_warning(21 * MIB - 1, 20).is_none());
        let warning = size_warning(21 * MIB, 20).unwrap();
        assert!(warning.contains("21 MiB"));
        assert!(size_warning(MIB, 0).is_some());
        assert!(size_warning(MIB - 1, 0).is_none());
    }

    // =========================================================================
    // run_with_service
    // =========================================================================

    #[test]
    fn uploads_and_assigns_channel() {
        let service = RecordingService::default();
        let prepared = prepare("1.2.3", b"zip".to_vec(), None).unwrap();
        run_with_service(&context(), &args(Some("production")), &service, "app", prepared)
            .unwrap();

        let uploads = service.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1.as_deref(), Some(b"zip".as_slice()));
        assert_eq!(
            *service.channels.borrow(),
            vec![("production".to_string(), "1.2.3".to_string())]
        );
    }

    #[test]
    fn no_channel_leaves_channels_alone() {
        let service = RecordingService::default();
        let prepared = prepare("1.2.3", b"zip".to_vec(), None).unwrap();
        run_with_service(&context(), &args(None), &service, "app", prepared).unwrap();

        assert!(service.channels.borrow().is_empty());
    }
}
