//! Microphone capture.
//!
//! The capture device runs for the whole session; mute and hold are applied
//! downstream by the session engine, which drops frames before transmission
//! so toggling is instantaneous.

use crate::error::{ParloError, Result};

/// Source of live capture samples.
///
/// Implementations buffer device callbacks internally; `read_samples`
/// drains whatever accumulated since the last call. This trait allows
/// swapping implementations (real CPAL device vs mock).
pub trait CaptureSource: Send {
    /// Start delivering samples. Idempotent.
    fn start(&mut self) -> Result<()>;

    /// Stop the device stream. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Drain buffered PCM16 mono samples at the input rate.
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Factory creating a fresh capture source for each session.
pub type CaptureFactory = Box<dyn Fn() -> Result<Box<dyn CaptureSource>> + Send + Sync>;

/// Mock capture source for testing.
///
/// Yields queued sample batches, one per `read_samples` call, then
/// empties. The queue and the start/stop bookkeeping live behind a shared
/// state handle, so tests can keep feeding samples after the source has
/// been moved into the engine.
#[derive(Debug, Clone, Default)]
pub struct MockCaptureState {
    pub start_count: u32,
    pub stop_count: u32,
    batches: std::collections::VecDeque<Vec<i16>>,
}

impl MockCaptureState {
    /// Queue a batch of samples for a later `read_samples` call.
    pub fn push_batch(&mut self, samples: Vec<i16>) {
        self.batches.push_back(samples);
    }
}

pub struct MockCaptureSource {
    fail_start: bool,
    state: std::sync::Arc<std::sync::Mutex<MockCaptureState>>,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self {
            fail_start: false,
            state: std::sync::Arc::new(std::sync::Mutex::new(MockCaptureState::default())),
        }
    }

    /// Queue a batch of samples to return from one `read_samples` call.
    pub fn with_batch(self, samples: Vec<i16>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.push_batch(samples);
        }
        self
    }

    /// Configure `start` to fail, simulating a denied capture device.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Shared handle for asserting start/stop calls after the source has
    /// been moved into the engine.
    pub fn state(&self) -> std::sync::Arc<std::sync::Mutex<MockCaptureState>> {
        self.state.clone()
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(ParloError::AudioCapture {
                message: "mock capture denied".to_string(),
            });
        }
        if let Ok(mut state) = self.state.lock() {
            state.start_count += 1;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.stop_count += 1;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut state = self.state.lock().map_err(|_| ParloError::AudioCapture {
            message: "mock capture state poisoned".to_string(),
        })?;
        Ok(state.batches.pop_front().unwrap_or_default())
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_impl::{CpalCaptureSource, list_devices, suppress_audio_warnings};

#[cfg(feature = "cpal-audio")]
mod cpal_impl {
    use super::CaptureSource;
    use crate::audio::f32_to_i16;
    use crate::defaults;
    use crate::error::{ParloError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};

    /// Run a closure with stderr temporarily redirected to /dev/null.
    ///
    /// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers when
    /// probing audio backends. The messages are harmless but confusing.
    ///
    /// # Safety
    /// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
    /// Safe as long as no other thread is concurrently manipulating fd 2.
    fn with_suppressed_stderr<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        unsafe {
            let saved_fd = libc::dup(2);
            let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if saved_fd >= 0 && devnull >= 0 {
                libc::dup2(devnull, 2);
                libc::close(devnull);
            }

            let result = f();

            if saved_fd >= 0 {
                libc::dup2(saved_fd, 2);
                libc::close(saved_fd);
            }

            result
        }
    }

    /// Suppress noisy JACK/ALSA messages during audio backend probing.
    ///
    /// # Safety
    /// Modifies environment variables; call before spawning threads.
    pub fn suppress_audio_warnings() {
        // SAFETY: Called at startup before any threads are spawned
        unsafe {
            std::env::set_var("JACK_NO_START_SERVER", "1");
            std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
            std::env::set_var("PIPEWIRE_DEBUG", "0");
            std::env::set_var("ALSA_DEBUG", "0");
            std::env::set_var("PW_LOG", "0");
        }
    }

    /// Preferred device names for GNOME/PipeWire environments.
    const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

    /// Device name patterns to filter out (not useful for voice input).
    const FILTERED_PATTERNS: &[&str] = &[
        "surround",
        "front:",
        "rear:",
        "center:",
        "side:",
        "Digital Output",
        "HDMI",
        "S/PDIF",
    ];

    fn should_filter_device(name: &str) -> bool {
        let lower = name.to_lowercase();
        FILTERED_PATTERNS
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }

    fn is_preferred_device(name: &str) -> bool {
        let lower = name.to_lowercase();
        PREFERRED_DEVICES
            .iter()
            .any(|pref| lower.contains(&pref.to_lowercase()))
    }

    /// List available audio input devices, filtered and with preferred
    /// devices marked "\[recommended\]".
    ///
    /// # Errors
    /// Returns `ParloError::AudioCapture` if device enumeration fails.
    pub fn list_devices() -> Result<Vec<String>> {
        let (host, devices) = with_suppressed_stderr(|| {
            let host = cpal::default_host();
            let devices = host.input_devices();
            (host, devices)
        });
        let _ = host; // keep host alive while iterating devices
        let devices = devices.map_err(|e| ParloError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                if should_filter_device(&name) {
                    continue;
                }
                if is_preferred_device(&name) {
                    device_names.push(format!("{} [recommended]", name));
                } else {
                    device_names.push(name);
                }
            }
        }

        Ok(device_names)
    }

    /// Get the best default input device, preferring PipeWire/PulseAudio so
    /// the desktop's device selection is respected.
    fn get_best_default_device() -> Result<cpal::Device> {
        with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Ok(devices) = host.input_devices() {
                for device in devices {
                    if let Ok(name) = device.name()
                        && is_preferred_device(&name)
                    {
                        return Ok(device);
                    }
                }
            }

            host.default_input_device()
                .ok_or_else(|| ParloError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })
        })
    }

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is only accessed from one place at a time through
    /// the Mutex in CpalCaptureSource; its methods are called synchronously.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Real microphone capture at 16kHz mono PCM16.
    ///
    /// Tries an i16 stream first, then f32 with software conversion.
    /// PipeWire/PulseAudio resample transparently to the requested rate.
    pub struct CpalCaptureSource {
        device: cpal::Device,
        stream: Arc<Mutex<Option<SendableStream>>>,
        buffer: Arc<Mutex<Vec<i16>>>,
    }

    impl CpalCaptureSource {
        /// Create a capture source for the named device, or the best
        /// default when `device_name` is None.
        pub fn new(device_name: Option<&str>) -> Result<Self> {
            let device = with_suppressed_stderr(|| {
                let host = cpal::default_host();

                if let Some(name) = device_name {
                    let devices = host
                        .input_devices()
                        .map_err(|e| ParloError::AudioCapture {
                            message: format!("Failed to enumerate devices: {}", e),
                        })?;

                    for dev in devices {
                        if let Ok(dev_name) = dev.name()
                            && dev_name == name
                        {
                            return Ok(dev);
                        }
                    }

                    Err(ParloError::AudioDeviceNotFound {
                        device: name.to_string(),
                    })
                } else {
                    get_best_default_device()
                }
            })?;

            Ok(Self {
                device,
                stream: Arc::new(Mutex::new(None)),
                buffer: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn build_stream(&self) -> Result<cpal::Stream> {
            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(defaults::INPUT_SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_callback = |err| {
                eprintln!("parlo: audio stream error: {}", err);
            };

            // i16/16kHz/mono — PipeWire/PulseAudio convert transparently
            let buffer = Arc::clone(&self.buffer);
            if let Ok(stream) = self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                err_callback,
                None,
            ) {
                return Ok(stream);
            }

            // f32/16kHz/mono — for devices that only expose float formats
            let buffer = Arc::clone(&self.buffer);
            self.device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted = f32_to_i16(data);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| ParloError::AudioCapture {
                    message: format!("Failed to build input stream: {}", e),
                })
        }
    }

    impl CaptureSource for CpalCaptureSource {
        fn start(&mut self) -> Result<()> {
            {
                let guard = self.stream.lock().map_err(|e| ParloError::AudioCapture {
                    message: format!("Failed to lock stream: {}", e),
                })?;
                if guard.is_some() {
                    return Ok(()); // Already started
                }
            }

            let stream = self.build_stream()?;
            stream.play().map_err(|e| ParloError::AudioCapture {
                message: format!("Failed to start audio stream: {}", e),
            })?;

            let mut guard = self.stream.lock().map_err(|e| ParloError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            *guard = Some(SendableStream(stream));
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            let mut guard = self.stream.lock().map_err(|e| ParloError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;

            if let Some(stream) = guard.take() {
                stream.0.pause().map_err(|e| ParloError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
            }
            Ok(())
        }

        fn read_samples(&mut self) -> Result<Vec<i16>> {
            let mut buffer = self.buffer.lock().map_err(|e| ParloError::AudioCapture {
                message: format!("Failed to lock audio buffer: {}", e),
            })?;

            let samples = std::mem::take(&mut *buffer);
            Ok(samples)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_should_filter_device() {
            assert!(should_filter_device("surround51"));
            assert!(should_filter_device("front:CARD=PCH"));
            assert!(should_filter_device("HDMI Output"));
            assert!(!should_filter_device("pipewire"));
            assert!(!should_filter_device("Built-in Audio"));
        }

        #[test]
        fn test_is_preferred_device() {
            assert!(is_preferred_device("pipewire"));
            assert!(is_preferred_device("PulseAudio"));
            assert!(!is_preferred_device("hw:0,0"));
            assert!(!is_preferred_device("default"));
        }

        #[test]
        fn test_create_with_invalid_device_name() {
            let source = CpalCaptureSource::new(Some("NonExistentDevice12345"));
            match source {
                Err(ParloError::AudioDeviceNotFound { device }) => {
                    assert_eq!(device, "NonExistentDevice12345");
                }
                Err(ParloError::AudioCapture { .. }) => {
                    // Device enumeration itself may fail on CI without audio
                }
                other => panic!("Expected device error, got {:?}", other.map(|_| ())),
            }
        }

        #[test]
        #[ignore] // Requires audio hardware
        fn test_capture_start_stop_cycle() {
            let mut source = CpalCaptureSource::new(None).expect("Failed to create source");
            for _ in 0..3 {
                assert!(source.start().is_ok());
                std::thread::sleep(std::time::Duration::from_millis(50));
                assert!(source.stop().is_ok());
            }
        }

        #[test]
        #[ignore] // Requires audio hardware
        fn test_read_samples_drains_buffer() {
            let mut source = CpalCaptureSource::new(None).expect("Failed to create source");
            source.start().expect("Failed to start");
            std::thread::sleep(std::time::Duration::from_millis(100));
            let _first = source.read_samples().expect("Failed to read");
            let _second = source.read_samples().expect("Failed to read");
            source.stop().expect("Failed to stop");
        }
    }
}
