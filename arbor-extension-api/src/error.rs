//! Error types for extension authors

use thiserror::Error;

/// Errors that extension code can return
#[derive(Error, Debug)]
pub enum ExtensionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),

    /// Duplicate command registration
    #[error("Duplicate command: {0}")]
    DuplicateCommand(String),

    /// Duplicate route registration
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),
}

impl ExtensionError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for ExtensionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = ExtensionError::Config("missing key".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: missing key");

        let custom_err = ExtensionError::Custom("something happened".to_string());
        assert_eq!(custom_err.to_string(), "something happened");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let ext_err: ExtensionError = io_err.into();

        assert!(matches!(ext_err, ExtensionError::Io(_)));
        assert!(ext_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let bad: Result<i64, _> = serde_json::from_str("not json");
        let ext_err: ExtensionError = bad.unwrap_err().into();
        assert!(matches!(ext_err, ExtensionError::Json(_)));
    }

    #[test]
    fn test_helper_constructors() {
        let err = ExtensionError::custom("test");
        assert!(matches!(err, ExtensionError::Custom(_)));

        let err = ExtensionError::config("bad config");
        assert!(matches!(err, ExtensionError::Config(_)));

        let err = ExtensionError::invalid_input("missing param");
        assert!(matches!(err, ExtensionError::InvalidInput(_)));
    }

    #[test]
    fn test_duplicate_command_error() {
        let err = ExtensionError::DuplicateCommand("report".into());
        assert!(err.to_string().contains("report"));
    }

    #[test]
    fn test_duplicate_route_error() {
        let err = ExtensionError::DuplicateRoute("GET /stats".into());
        assert!(err.to_string().contains("GET /stats"));
    }
}
