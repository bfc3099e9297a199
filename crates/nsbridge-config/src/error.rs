use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, merging, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Writing the commented default config failed.
    #[error("failed to create default config at {path}: {reason}")]
    CreateDefault { path: PathBuf, reason: String },

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// Dotted field path (e.g. `ios.debug_port`).
        field: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_default_names_path_and_reason() {
        let err = ConfigError::CreateDefault {
            path: PathBuf::from("/ro/config.toml"),
            reason: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/ro/config.toml"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn validation_display_contains_field_and_message() {
        let err = ConfigError::Validation {
            field: "ios.debug_port".into(),
            message: "must be non-zero".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation error: ios.debug_port: must be non-zero"
        );
    }

    #[test]
    fn io_error_converts() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = ConfigError::from(inner);
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
