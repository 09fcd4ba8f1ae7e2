pub mod app;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod remote;
pub mod retention;

pub use error::{OtaError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
