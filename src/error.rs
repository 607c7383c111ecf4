//! Error types for parlo.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParloError {
    // Session lifecycle errors
    #[error("Session is {actual}, expected {expected}")]
    InvalidState { expected: String, actual: String },

    #[error("Capture device permission denied: {message}")]
    PermissionDenied { message: String },

    // Channel errors
    #[error("Failed to open session channel: {message}")]
    ChannelOpen { message: String },

    #[error("Session channel error: {message}")]
    ChannelRuntime { message: String },

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    #[error("Undecodable audio chunk: {message}")]
    Decode { message: String },

    // Translation errors
    #[error("Translation failed: {message}")]
    Translation { message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ParloError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let error = ParloError::InvalidState {
            expected: "idle".to_string(),
            actual: "speaking".to_string(),
        };
        assert_eq!(error.to_string(), "Session is speaking, expected idle");
    }

    #[test]
    fn test_permission_denied_display() {
        let error = ParloError::PermissionDenied {
            message: "microphone access blocked".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Capture device permission denied: microphone access blocked"
        );
    }

    #[test]
    fn test_channel_open_display() {
        let error = ParloError::ChannelOpen {
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to open session channel: connection refused"
        );
    }

    #[test]
    fn test_channel_runtime_display() {
        let error = ParloError::ChannelRuntime {
            message: "stream reset".to_string(),
        };
        assert_eq!(error.to_string(), "Session channel error: stream reset");
    }

    #[test]
    fn test_audio_device_not_found_display() {
        let error = ParloError::AudioDeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_decode_display() {
        let error = ParloError::Decode {
            message: "odd byte length".to_string(),
        };
        assert_eq!(error.to_string(), "Undecodable audio chunk: odd byte length");
    }

    #[test]
    fn test_translation_display() {
        let error = ParloError::Translation {
            message: "remote call failed".to_string(),
        };
        assert_eq!(error.to_string(), "Translation failed: remote call failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let error: ParloError = io_error.into();
        assert!(matches!(error, ParloError::Io(_)));
        assert!(error.to_string().contains("file missing"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let result: std::result::Result<toml::Value, _> = toml::from_str("[broken");
        let toml_error = result.unwrap_err();
        let error: ParloError = toml_error.into();
        assert!(matches!(error, ParloError::Config(_)));
    }

    #[test]
    fn test_other_error_display() {
        let error = ParloError::Other("something unexpected".to_string());
        assert_eq!(error.to_string(), "something unexpected");
    }

    #[test]
    fn test_errors_implement_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        let error = ParloError::Other("test".to_string());
        assert_error(&error);
    }
}
