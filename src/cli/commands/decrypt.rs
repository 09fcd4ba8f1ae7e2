//! otaup decrypt - Decrypt a bundle archive with its session key

use std::fs;
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serde_json::json;

use super::{KeyOptions, input_archive, sibling_output};
use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::crypto;
use crate::error::Result;
use crate::keys::{KeyResolver, KeyRole};

pub const DECRYPTED_SUFFIX: &str = "_decrypted.zip";

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted bundle zip
    pub zip: PathBuf,

    /// Session key printed when the bundle was encrypted
    pub session_key: String,

    #[command(flatten)]
    pub key: KeyOptions,
}

pub fn run(ctx: &AppContext, args: &DecryptArgs) -> Result<()> {
    let input = input_archive(ctx, &args.zip)?;

    let app_id = ctx.optional_app_id();
    let strategy = ctx.stored_strategy(app_id.as_deref())?;
    let files = ctx.key_files();
    let paths = ctx.key_paths();
    let resolved = KeyResolver::new(&files, &paths).resolve(
        strategy.as_ref(),
        KeyRole::Decode,
        &args.key.request(),
    )?;

    let payload = fs::read(&input)?;
    let archive = crypto::decode(
        &payload,
        &args.session_key,
        &resolved.material,
        resolved.strategy,
    )?;

    let output = sibling_output(&input, DECRYPTED_SUFFIX);
    fs::write(&output, &archive)?;
    let checksum = crypto::checksum(&archive);

    if ctx.robot_mode {
        return emit_json(&robot_ok(json!({
            "input": input,
            "output": output,
            "strategy": resolved.strategy.to_string(),
            "key_source": resolved.source.to_string(),
            "checksum": checksum,
        })));
    }

    println!("{} Decrypted zip saved at {}", "✓".green(), output.display());
    println!("  checksum {}", checksum.dimmed());
    Ok(())
}
