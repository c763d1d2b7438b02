//! VL-017: Configuration parsing and validation.
//!
//! Parses vellum.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Include depth limit of at least 1
//! - Non-empty, identifier-shaped host marker and constant names
//! - Template set names without path separators

use super::types::*;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a vellum.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<VellumConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a vellum.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<VellumConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_set_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &VellumConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut error = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        error(format!("version must be \"1.0\", got \"{}\"", config.version));
    }

    if config.max_include_depth == 0 {
        error("max_include_depth must be at least 1".to_string());
    }

    if config.host_marker.is_empty() {
        error("host_marker must not be empty".to_string());
    } else if !is_identifier(&config.host_marker) {
        error(format!(
            "host_marker '{}' must be an identifier",
            config.host_marker
        ));
    }

    for (field, set) in [
        ("template", &config.template),
        ("default_template", &config.default_template),
    ] {
        if !is_set_name(set) {
            error(format!("{} '{}' is not a valid template set name", field, set));
        }
    }

    for name in config.constants.keys() {
        if !is_identifier(name) {
            error(format!("constant '{}' must be an identifier", name));
        }
        if name == &config.host_marker {
            error(format!("constant '{}' shadows the host marker", name));
        }
    }

    errors
}
