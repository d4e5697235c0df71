//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

static C_IDENTIFIER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Validate that a symbol name is a plain C identifier.
pub fn validate_c_identifier(name: &str) -> Result<(), ValidationError> {
    let re = C_IDENTIFIER
        .as_ref()
        .ok_or_else(|| ValidationError::new("invalid_regex"))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_c_identifier"))
    }
}

/// Validate a log level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error", "off"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that no plugin path is empty.
pub fn validate_plugin_paths(paths: &[PathBuf]) -> Result<(), ValidationError> {
    if paths.iter().any(|p| p.as_os_str().is_empty()) {
        return Err(ValidationError::new("empty_plugin_path"));
    }
    Ok(())
}
