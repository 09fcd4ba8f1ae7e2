//! otaup key - Create or register the app's RSA keys
//!
//! `create` writes a fresh key pair to the default key files; `save`
//! registers an existing decode key. Both store the key the app decodes
//! with as the app's decrypt strategy.

use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::json;

use super::KeyOptions;
use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::error::Result;
use crate::keys::{
    ConfigPatch, CreateOptions, DecryptStrategy, KeyKind, KeyResolver, KeyStrategy, create_keys,
    save_key,
};

#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Generate a key pair and store the decode key for the app
    Create(CreateArgs),

    /// Store an existing decode key for the app
    Save(SaveArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,

    /// Key kind the app decrypts with (public or private)
    #[arg(long, value_name = "KIND")]
    pub strategy: Option<KeyKind>,
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    #[command(flatten)]
    pub key: KeyOptions,

    /// Key kind the app decrypts with (default: the stored kind, else private)
    #[arg(long, value_name = "KIND")]
    pub strategy: Option<KeyKind>,
}

pub fn run(ctx: &AppContext, args: &KeyArgs) -> Result<()> {
    match &args.command {
        KeyCommand::Create(create) => run_create(ctx, create),
        KeyCommand::Save(save) => run_save(ctx, save),
    }
}

fn run_create(ctx: &AppContext, args: &CreateArgs) -> Result<()> {
    let app_id = ctx.require_app_id(None)?;
    let current = ctx.stored_strategy(Some(&app_id))?;
    let mut files = ctx.key_files();

    let created = create_keys(
        &mut files,
        &ctx.key_paths(),
        current.as_ref(),
        CreateOptions {
            app_id: &app_id,
            strategy_override: args.strategy,
            force: args.force,
            bits: ctx.config.keys.bits,
        },
    )?;
    let patch = created.patch;
    let strategy = created.strategy;
    apply_patch(ctx, patch)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(json!({
            "app_id": app_id,
            "strategy": strategy.to_string(),
            "encode_kind": strategy.encode_kind(),
            "decode_kind": strategy.decode_kind(),
            "written": created.written,
        })));
    }

    println!("{}", "Key pair created".bold());
    for path in &created.written {
        println!("  {} {}", "wrote".green(), path.display());
    }
    print_pairing(strategy);
    println!();
    println!(
        "Keep {} secret. Anyone holding it can {}.",
        ctx.key_paths().private.display().to_string().yellow(),
        match strategy {
            KeyStrategy::PrivateDecrypt => "decrypt your bundles",
            KeyStrategy::PublicDecrypt => "publish bundles your app will trust",
        }
    );
    if strategy == KeyStrategy::PublicDecrypt {
        println!(
            "{} the public key ships inside the app, so bundles are authenticated but not secret.",
            "Note:".yellow()
        );
    }
    Ok(())
}

fn run_save(ctx: &AppContext, args: &SaveArgs) -> Result<()> {
    let app_id = ctx.require_app_id(None)?;
    let current = match args.strategy {
        Some(kind) => Some(DecryptStrategy::new(kind)),
        None => ctx.stored_strategy(Some(&app_id))?,
    };
    let files = ctx.key_files();
    let paths = ctx.key_paths();
    let resolver = KeyResolver::new(&files, &paths);

    let patch = save_key(&resolver, current.as_ref(), &args.key.request(), &app_id)?;
    let kind = patch.strategy.kind;
    apply_patch(ctx, patch)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(json!({
            "app_id": app_id,
            "strategy": kind,
        })));
    }

    println!("{} {} key saved for {}", "✓".green(), kind, app_id.cyan());
    print_pairing(KeyStrategy::from_decode_kind(kind));
    Ok(())
}

fn apply_patch(ctx: &AppContext, patch: ConfigPatch) -> Result<()> {
    let mut store = ctx.strategy_store();
    patch.apply(&mut store)?;
    tracing::debug!(path = %store.path().display(), "strategy store updated");
    Ok(())
}

fn print_pairing(strategy: KeyStrategy) {
    println!(
        "  bundles are encrypted with the {} key, the app decrypts with the {} key",
        strategy.encode_kind().to_string().cyan(),
        strategy.decode_kind().to_string().cyan()
    );
}
