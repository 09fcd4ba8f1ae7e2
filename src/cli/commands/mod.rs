//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use std::path::{Path, PathBuf};

use clap::Args;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::{OtaError, Result};
use crate::keys::KeyRequest;

pub mod cleanup;
pub mod decrypt;
pub mod encrypt;
pub mod key;
pub mod upload;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Key(args) => key::run(ctx, args),
        Commands::Encrypt(args) => encrypt::run(ctx, args),
        Commands::Decrypt(args) => decrypt::run(ctx, args),
        Commands::Cleanup(args) => cleanup::run(ctx, args),
        Commands::Upload(args) => upload::run(ctx, args),
    }
}

/// Key options shared by commands that resolve a key.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyOptions {
    /// Path to the key file (relative to the project root)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// PEM key contents, used instead of any key file
    #[arg(long, value_name = "PEM")]
    pub key_data: Option<String>,
}

impl KeyOptions {
    #[must_use]
    pub fn request(&self) -> KeyRequest<'_> {
        KeyRequest {
            key_data: self.key_data.as_deref(),
            key_path: self.key.as_deref(),
        }
    }

    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        self.key.is_some() || self.key_data.is_some()
    }
}

/// Resolve an input archive against the project root and make sure it exists.
pub(crate) fn input_archive(ctx: &AppContext, path: &Path) -> Result<PathBuf> {
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.root.join(path)
    };
    if !full.is_file() {
        return Err(OtaError::NotFound(format!("zip not found at {}", full.display())));
    }
    Ok(full)
}

/// `<input>` + `suffix`, next to the input.
pub(crate) fn sibling_output(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
