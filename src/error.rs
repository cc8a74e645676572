//! Error types for hotswap-watch.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for hotswap-watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur when registering watches or delivering events.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A watch was registered with an empty key (path or logical name).
    #[error("Watch key must not be empty")]
    EmptyKey,

    /// The observer handed to a registry was already dropped.
    #[error("Observer is not alive")]
    NilObserver,

    /// A live watch already exists for this key.
    #[error("Duplicate watch for key '{0}'")]
    DuplicateKey(String),

    /// No watch is registered under this key.
    #[error("No watch registered for key '{0}'")]
    NotRegistered(String),

    /// The config consumer handed to the reloader was already dropped.
    #[error("Config consumer is not alive")]
    NilConsumer,

    /// A config consumer reported an empty name.
    #[error("Config consumer name must not be empty")]
    EmptyName,

    /// The event source could not open a subscription for a path.
    #[error("Failed to subscribe to '{}': {reason}", path.display())]
    SubscribeError {
        /// Path that was being subscribed
        path: PathBuf,
        /// Reason reported by the event source
        reason: String,
    },

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse configuration bytes.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// An observer rejected an event.
    #[error("Observer failed: {0}")]
    ObserverError(String),

    /// Failed to load crate settings.
    #[error("Failed to load settings: {0}")]
    SettingsError(String),
}

impl WatchError {
    /// Create an observer error from any displayable message.
    pub fn observer(msg: impl fmt::Display) -> Self {
        Self::ObserverError(msg.to_string())
    }

    /// Returns true when the error means the watched path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IoError(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Returns true for errors raised while validating registration arguments.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyKey
                | Self::NilObserver
                | Self::DuplicateKey(_)
                | Self::NilConsumer
                | Self::EmptyName
        )
    }
}

/// Validation error for configuration validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for WatchError {
    fn from(err: ValidationError) -> Self {
        WatchError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = WatchError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!WatchError::EmptyKey.is_not_found());
    }

    #[test]
    fn test_registration_errors() {
        assert!(WatchError::EmptyKey.is_registration_error());
        assert!(WatchError::DuplicateKey("a".into()).is_registration_error());
        assert!(!WatchError::ParseError("bad".into()).is_registration_error());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::Multiple(vec![
            ValidationError::custom("first"),
            ValidationError::invalid_field("port", "must be >= 1024"),
        ]);
        let text = err.to_string();
        assert!(text.contains("1. first"));
        assert!(text.contains("Field 'port' is invalid"));

        let watch_err: WatchError = ValidationError::custom("nope").into();
        assert!(matches!(watch_err, WatchError::ValidationError(_)));
    }
}
