//! Error types for Chime.

use thiserror::Error;

/// Result type alias using Chime's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Chime.
#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Sound system initialization failed: {0}")]
    Initialization(String),

    #[error("Sound system is not initialized")]
    NotInitialized,

    // Asset errors
    #[error("Failed to load sound: {0}")]
    Load(#[from] LoadError),

    // Audio errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Resample error: {0}")]
    Resample(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors produced while turning a resource path into a playable asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),
}

impl Error {
    /// Returns true if retrying the failed operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_) | Self::NotInitialized | Self::AudioOutput(_)
        )
    }

    /// Returns true if this error means the requested resource does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Load(LoadError::NotFound(_)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Initialization("no device".into()).is_retryable());
        assert!(Error::NotInitialized.is_retryable());
        assert!(!Error::Load(LoadError::Decode("bad header".into())).is_retryable());
        assert!(!Error::Config("init_attempts".into()).is_retryable());
    }

    #[test]
    fn test_load_error_conversion() {
        let err: Error = LoadError::NotFound("sfx/jump.wav".into()).into();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Failed to load sound: Resource not found: sfx/jump.wav"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::Initialization("no output device".into());
        assert_eq!(
            err.to_string(),
            "Sound system initialization failed: no output device"
        );
    }
}
