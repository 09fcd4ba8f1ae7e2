//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::OutputFormat;

pub mod commands;
pub mod output;

/// otaup - Encrypt, upload and prune over-the-air update bundles
#[derive(Parser, Debug)]
#[command(name = "otaup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (human, json)
    #[arg(long, short = 'O', global = true, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Machine-readable JSON output (shorthand for --output-format=json)
    #[arg(long, short = 'm', global = true, alias = "robot")]
    pub machine: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/otaup/config.toml + .otaup/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root holding key files and .otaup/ (default: current directory)
    #[arg(long, global = true, env = "OTAUP_ROOT")]
    pub root: Option<PathBuf>,

    /// App id whose decrypt strategy applies (default: app.app_id)
    #[arg(long, global = true)]
    pub app_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective output format. `--output-format` wins over `--machine`.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if let Some(format) = self.output_format {
            return format;
        }
        if self.machine {
            return OutputFormat::Json;
        }
        OutputFormat::Human
    }

    #[must_use]
    pub fn robot_mode(&self) -> bool {
        self.output_format().is_machine_readable()
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or register the app's RSA keys
    Key(commands::key::KeyArgs),

    /// Encrypt a bundle archive
    Encrypt(commands::encrypt::EncryptArgs),

    /// Decrypt a bundle archive with its session key
    Decrypt(commands::decrypt::DecryptArgs),

    /// Delete old bundle versions, keeping the newest and any in use
    Cleanup(commands::cleanup::CleanupArgs),

    /// Upload a bundle archive as a new version
    Upload(commands::upload::UploadArgs),
}
