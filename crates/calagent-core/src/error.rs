//! Configuration error types shared across the calagent crates.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Failed to write configuration: {0}")]
    Write(String),
}

impl ConfigError {
    /// Returns a short, actionable message for terminal output.
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration file not found. Check the --config path.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Write(_) => "Could not save the configuration file.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors = [
            ConfigError::NotFound("x".into()),
            ConfigError::Invalid("x".into()),
            ConfigError::ParseError("x".into()),
            ConfigError::Write("x".into()),
        ];

        for err in &errors {
            assert!(!err.user_message().is_empty());
        }
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ConfigError::Invalid("calendar.timezone: Unknown IANA timezone".into());
        assert!(err.to_string().contains("calendar.timezone"));
    }
}
