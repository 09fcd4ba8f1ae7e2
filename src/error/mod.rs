//! Error handling for otaup.
//!
//! This module provides:
//! - [`OtaError`]: The main error enum for all otaup operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestions and context
//! - Suggestion helpers for context-aware error recovery hints

mod codes;
mod suggestions;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::keys::KeyKind;

pub use codes::ErrorCode;
pub use suggestions::suggest_for_error;

/// Stage at which a decode was rejected.
///
/// Only ever logged at debug level; the displayed message is the same for
/// every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailure {
    /// The key is not of the kind the strategy decodes with.
    KeyKind,
    /// The session key string is not valid base64 or has the wrong length.
    MalformedSessionKey,
    /// The RSA unwrap of the session key was rejected.
    Unwrap,
    /// The payload failed AES-GCM authentication.
    Payload,
}

impl std::fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyKind => write!(f, "key kind"),
            Self::MalformedSessionKey => write!(f, "malformed session key"),
            Self::Unwrap => write!(f, "session key unwrap"),
            Self::Payload => write!(f, "payload authentication"),
        }
    }
}

#[allow(clippy::ref_option)]
fn found_phrase(found: &Option<KeyKind>) -> String {
    found.map_or_else(
        || "an unrecognized PEM header".to_string(),
        |kind| format!("a {kind} key"),
    )
}

/// Main error type for otaup operations.
#[derive(Error, Debug)]
pub enum OtaError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot find {kind} key; checked {}", .checked.join(", "))]
    KeyNotFound { kind: KeyKind, checked: Vec<String> },

    #[error("Expected a {expected} key from {source_desc} but found {}", found_phrase(.found))]
    KeyKindMismatch {
        expected: KeyKind,
        found: Option<KeyKind>,
        source_desc: String,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Decryption failed")]
    DecryptionFailed(DecryptFailure),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl OtaError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::KeyKindMismatch { .. } => ErrorCode::KeyKindMismatch,
            Self::InvalidKey(_) => ErrorCode::KeyInvalid,
            Self::DecryptionFailed(_) => ErrorCode::DecryptionFailed,
            Self::EncryptionFailed(_) => ErrorCode::EncryptionFailed,
            Self::InvalidRange(_) => ErrorCode::InvalidRange,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::Remote(_) => ErrorCode::RemoteRejected,
            Self::Network(_) => ErrorCode::NetworkUnreachable,
            Self::ValidationFailed(_) => ErrorCode::ValidationFailed,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Cancelled(_) => ErrorCode::Cancelled,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::KeyNotFound { kind, checked } => {
                Some(serde_json::json!({ "kind": kind, "checked": checked }))
            }
            Self::KeyKindMismatch {
                expected,
                found,
                source_desc,
            } => Some(serde_json::json!({
                "expected": expected,
                "found": found,
                "source": source_desc,
            })),
            Self::InvalidRange(input) => Some(serde_json::json!({ "input": input })),
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_ota_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Rendered in robot mode so scripts can branch on the code instead of
/// parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "KEY_NOT_FOUND")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 101)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "key", "config", "network")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from an [`OtaError`].
    #[must_use]
    pub fn from_ota_error(err: &OtaError) -> Self {
        let code = err.code();
        let context = err.context();
        let suggestion = suggest_for_error(code, context.as_ref());

        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion,
            context,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&OtaError> for StructuredError {
    fn from(err: &OtaError) -> Self {
        Self::from_ota_error(err)
    }
}

/// Result type alias using [`OtaError`].
pub type Result<T> = std::result::Result<T, OtaError>;
