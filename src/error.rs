//! Crate-wide error type
//!
//! The driver fails fast: every collaborator error is propagated with `?` and
//! ends the run. The last checkpoint written before the failure stays valid.

use crate::config::ValidationError;
use thiserror::Error;

/// Result alias used throughout afinar
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the training driver and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Tensor shapes disagree
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Model forward/backward failure
    #[error("Model error: {0}")]
    Model(String),

    /// Augmentation collaborator failure
    #[error("Augmentation error: {0}")]
    Augment(String),

    /// Checkpoint content is inconsistent with the running components
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::ShapeMismatch(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ShapeMismatch("logits rows 4 vs labels 3".to_string());
        assert_eq!(err.to_string(), "Shape mismatch: logits rows 4 vs labels 3");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: Error = ValidationError::InvalidEpochs(0).into();
        assert!(err.to_string().contains("epochs"));
    }
}
