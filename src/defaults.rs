//! Default configuration constants for parlo.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Capture-side audio sample rate in Hz.
///
/// 16kHz mono is what the remote session channel expects for realtime
/// speech input and is the standard rate for speech recognition.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Playback-side audio sample rate in Hz.
///
/// The channel synthesizes speech as 24kHz mono PCM16; every inbound
/// audio payload is decoded and scheduled at this rate.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Number of samples per outbound capture frame.
///
/// 4096 samples at 16kHz is 256ms of audio per frame. Frames are sent
/// fire-and-forget; a smaller frame lowers latency but raises per-send
/// overhead.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// Capture polling interval in milliseconds.
///
/// The capture pump drains the device buffer at ~60Hz. The device keeps
/// its own ring buffer, so a missed poll never drops samples.
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 16;

/// Silence debounce before the session reports `processing`, in milliseconds.
///
/// When input transcription deltas stop arriving for this long and no
/// output has started, the session infers that the service is thinking.
/// This is a local heuristic, not a protocol guarantee: the value is a
/// tunable, and changing it does not affect correctness.
pub const PROCESSING_DEBOUNCE_MS: u64 = 1200;

/// MIME type for outbound capture frames.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Model identifier for the live session channel.
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Model identifier for the single request/response translation call.
pub const TRANSLATION_MODEL: &str = "gemini-2.5-flash";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_frame_duration_is_reasonable() {
        // A frame should hold between 50ms and 500ms of audio.
        let ms = CAPTURE_FRAME_SAMPLES as u64 * 1000 / INPUT_SAMPLE_RATE as u64;
        assert!((50..=500).contains(&ms), "frame duration {}ms", ms);
    }

    #[test]
    fn output_rate_exceeds_input_rate() {
        assert!(OUTPUT_SAMPLE_RATE > INPUT_SAMPLE_RATE);
    }

    #[test]
    fn capture_mime_type_names_input_rate() {
        assert!(CAPTURE_MIME_TYPE.contains(&INPUT_SAMPLE_RATE.to_string()));
    }
}
