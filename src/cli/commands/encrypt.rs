//! otaup encrypt - Encrypt a bundle archive
//!
//! Writes `<zip>_encrypted.zip` next to the input and prints the session key
//! the app needs to decrypt it.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serde_json::json;

use super::{KeyOptions, input_archive, sibling_output};
use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::crypto::{self, EncryptionEnvelope};
use crate::error::Result;
use crate::keys::{KeyResolver, KeyRole, ResolvedKey};

pub const ENCRYPTED_SUFFIX: &str = "_encrypted.zip";

pub const SESSION_KEY_WARNING: &str = "Store this session key with the bundle. Without it the encrypted bundle can never be decrypted.";

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Bundle zip to encrypt
    pub zip: PathBuf,

    #[command(flatten)]
    pub key: KeyOptions,
}

pub fn run(ctx: &AppContext, args: &EncryptArgs) -> Result<()> {
    let input = input_archive(ctx, &args.zip)?;
    let resolved = resolve_encode_key(ctx, &args.key)?;

    let archive = fs::read(&input)?;
    let checksum = crypto::checksum(&archive);
    let envelope = crypto::encode(&archive, &resolved.material, resolved.strategy)?;

    let output = sibling_output(&input, ENCRYPTED_SUFFIX);
    fs::write(&output, &envelope.payload)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(json!({
            "input": input,
            "output": output,
            "strategy": resolved.strategy.to_string(),
            "key_source": resolved.source.to_string(),
            "checksum": checksum,
            "session_key": envelope.session_key_wrapped,
        }))
        .with_warning(SESSION_KEY_WARNING));
    }

    println!(
        "{} encrypting with the {} key from {}",
        "→".cyan(),
        resolved.material.kind(),
        resolved.source
    );
    print_session_key(&envelope);
    println!("{} Encrypted zip saved at {}", "✓".green(), output.display());
    Ok(())
}

/// Resolve the encode-role key for the current app's strategy.
pub(crate) fn resolve_encode_key(ctx: &AppContext, options: &KeyOptions) -> Result<ResolvedKey> {
    let app_id = ctx.optional_app_id();
    let strategy = ctx.stored_strategy(app_id.as_deref())?;
    let files = ctx.key_files();
    let paths = ctx.key_paths();
    KeyResolver::new(&files, &paths).resolve(strategy.as_ref(), KeyRole::Encode, &options.request())
}

pub(crate) fn print_session_key(envelope: &EncryptionEnvelope) {
    println!("{} {}", "Session key:".bold(), envelope.session_key_wrapped);
    println!("{} {}", "Warning:".yellow(), SESSION_KEY_WARNING);
}
