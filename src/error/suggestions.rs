//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module with hints built
//! from the error's context.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a context-aware suggestion for an error.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::KeyNotFound => suggest_key_not_found(context),
        ErrorCode::KeyKindMismatch => suggest_key_kind_mismatch(context),
        ErrorCode::InvalidRange => suggest_invalid_range(context),
        ErrorCode::ConfigMissingRequired => suggest_config_missing_required(context),
        _ => code.suggestion().to_string(),
    }
}

fn suggest_key_not_found(context: Option<&Value>) -> String {
    let kind = context
        .and_then(|c| c.get("kind"))
        .and_then(Value::as_str);

    match kind {
        Some(kind) => format!(
            "No {kind} key was found. Either:\n  - run `otaup key create` to generate a key pair\n  - pass --key <path> pointing at a {kind} key file\n  - pass --key-data with the PEM contents"
        ),
        None => ErrorCode::KeyNotFound.suggestion().to_string(),
    }
}

fn suggest_key_kind_mismatch(context: Option<&Value>) -> String {
    let expected = context
        .and_then(|c| c.get("expected"))
        .and_then(Value::as_str);
    let source = context
        .and_then(|c| c.get("source"))
        .and_then(Value::as_str);

    match (expected, source) {
        (Some(expected), Some(source)) => format!(
            "{source} must hold a {expected} key for this app's decrypt strategy. Pass the matching key or change the strategy with `otaup key create --strategy`"
        ),
        _ => ErrorCode::KeyKindMismatch.suggestion().to_string(),
    }
}

fn suggest_invalid_range(context: Option<&Value>) -> String {
    match context.and_then(|c| c.get("input")).and_then(Value::as_str) {
        Some(input) => format!(
            "'{input}' is not a semver version. Use MAJOR.MINOR.PATCH, for example --bundle 1.2.0"
        ),
        None => ErrorCode::InvalidRange.suggestion().to_string(),
    }
}

fn suggest_config_missing_required(context: Option<&Value>) -> String {
    let key = context
        .and_then(|c| c.get("config_key"))
        .and_then(Value::as_str);

    match key {
        Some("app.app_id") => {
            "Pass the app id as an argument or set app.app_id in .otaup/config.toml (or OTAUP_APP_ID)".to_string()
        }
        Some("api.api_key") => {
            "Set api.api_key in ~/.config/otaup/config.toml or export OTAUP_API_KEY".to_string()
        }
        Some(key) => format!("Set `{key}` in .otaup/config.toml"),
        None => ErrorCode::ConfigMissingRequired.suggestion().to_string(),
    }
}
