//! parlo - Live duplex voice conversation engine
//!
//! Full-duplex voice chat with a remote conversational service: microphone
//! capture, gapless playback scheduling, streaming transcript aggregation,
//! and lazy transcript translation, all driven by a single session engine.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod channel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod lang;
pub mod session;
pub mod transcript;
pub mod translate;

// Core traits (capture → session → playback)
pub use audio::capture::CaptureSource;
pub use audio::playback::PlaybackSink;
pub use channel::{ChannelConnector, LiveChannel, ServerEvent};
pub use translate::Translator;

// Session engine
pub use session::{SessionController, SessionDeps, SessionEvent, Status};
pub use transcript::{Message, Speaker};

// Error handling
pub use error::{ParloError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
