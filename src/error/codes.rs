//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Key errors
//! - 2xx: Crypto errors
//! - 3xx: Retention errors
//! - 4xx: Config errors
//! - 5xx: Network / remote errors
//! - 6xx: Storage errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for robot mode output.
///
/// Each variant maps to a numeric code (e.g., `KeyNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Key errors (1xx)
    // ========================================
    /// E101: No key found in any of the checked locations
    KeyNotFound,
    /// E102: Key PEM header does not match the kind the strategy requires
    KeyKindMismatch,
    /// E103: Key PEM could not be parsed as an RSA key
    KeyInvalid,

    // ========================================
    // Crypto errors (2xx)
    // ========================================
    /// E201: Session key unwrap or payload decryption failed
    DecryptionFailed,
    /// E202: Session key wrap or payload encryption failed
    EncryptionFailed,

    // ========================================
    // Retention errors (3xx)
    // ========================================
    /// E301: Version range floor or ceiling is not valid semver
    InvalidRange,

    // ========================================
    // Config errors (4xx)
    // ========================================
    /// E401: Config file has invalid syntax or values
    ConfigInvalid,
    /// E402: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Network errors (5xx)
    // ========================================
    /// E501: Cannot reach the bundle service
    NetworkUnreachable,
    /// E502: The bundle service rejected the request
    RemoteRejected,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Serialization/deserialization failed
    SerializationError,
    /// E602: Target file already exists
    AlreadyExists,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Input validation failed
    ValidationFailed,
    /// E802: Operation was cancelled by the user
    Cancelled,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E905: Generic not found (catch-all)
    NotFound,
    /// E906: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `KeyNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::KeyNotFound => 101,
            Self::KeyKindMismatch => 102,
            Self::KeyInvalid => 103,
            Self::DecryptionFailed => 201,
            Self::EncryptionFailed => 202,
            Self::InvalidRange => 301,
            Self::ConfigInvalid => 401,
            Self::ConfigMissingRequired => 402,
            Self::NetworkUnreachable => 501,
            Self::RemoteRejected => 502,
            Self::SerializationError => 601,
            Self::AlreadyExists => 602,
            Self::ValidationFailed => 801,
            Self::Cancelled => 802,
            Self::NotFound => 905,
            Self::IoError => 906,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::KeyNotFound => "Run `otaup key create` to generate a key pair, or pass --key <path> / --key-data <pem>",
            Self::KeyKindMismatch => "Check the decrypt strategy kind for this app; the encode side and the app need complementary keys",
            Self::KeyInvalid => "The key must be a PKCS#1 PEM RSA key as written by `otaup key create`",
            Self::DecryptionFailed => "Make sure the session key and the key both belong to this bundle. A lost session key cannot be recovered",
            Self::EncryptionFailed => "The key may be too small to wrap a session key. Generate a 2048-bit key with `otaup key create --force`",
            Self::InvalidRange => "Pass a full semver version such as 1.2.0 to --bundle",
            Self::ConfigInvalid => "Check TOML syntax in .otaup/config.toml or ~/.config/otaup/config.toml",
            Self::ConfigMissingRequired => "Set the value in .otaup/config.toml or through the matching OTAUP_* environment variable",
            Self::NetworkUnreachable => "Check your network connection and the api.base_url setting",
            Self::RemoteRejected => "Check the API key and that the app id exists on the service",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::AlreadyExists => "Pass --force to overwrite the existing file",
            Self::ValidationFailed => "Review the reported problem and re-run the command with corrected arguments",
            Self::Cancelled => "Re-run the command and confirm, or pass --force",
            Self::NotFound => "The requested resource was not found. Check the path or identifier",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SerializationError | Self::IoError)
    }

    /// Get the category name for this error code.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "key",
            2 => "crypto",
            3 => "retention",
            4 => "config",
            5 => "network",
            6 => "storage",
            8 => "validation",
            _ => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
