//! Playback device layer.
//!
//! A [`PlaybackSink`] plays PCM16 chunks scheduled at absolute timestamps on
//! its own monotonic clock. The gapless-scheduling policy lives in
//! [`crate::audio::scheduler`]; the sink only honors start times, reports
//! natural completions, and supports immediate stop of individual buffers.

use crate::error::{ParloError, Result};

/// Identifier of one scheduled buffer while it is live in the sink.
pub type HandleId = u64;

/// Channel on which a sink reports naturally completed buffers.
pub type CompletionTx = tokio::sync::mpsc::UnboundedSender<HandleId>;

/// A decoded buffer of PCM16 mono samples at the output rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackChunk {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PlaybackChunk {
    /// Decode an inbound audio payload: little-endian PCM16 mono bytes at
    /// the output sample rate.
    ///
    /// # Errors
    /// Returns `ParloError::Decode` for empty or odd-length payloads.
    pub fn decode(data: &[u8], sample_rate: u32) -> Result<Self> {
        if data.is_empty() {
            return Err(ParloError::Decode {
                message: "empty audio payload".to_string(),
            });
        }
        if data.len() % 2 != 0 {
            return Err(ParloError::Decode {
                message: format!("odd payload length {}", data.len()),
            });
        }
        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Output device abstraction: schedule buffers at future timestamps on a
/// monotonic clock, stop any individual buffer immediately, and suspend the
/// clock for hold.
pub trait PlaybackSink: Send {
    /// Current time on the sink clock, in seconds. Frozen while suspended.
    fn now(&self) -> f64;

    /// Enqueue a chunk to begin at `start_at` seconds on the sink clock.
    /// The returned handle stays valid until natural completion (reported
    /// on the completion channel) or an explicit `stop`.
    fn schedule(&mut self, chunk: PlaybackChunk, start_at: f64) -> Result<HandleId>;

    /// Immediately stop and discard one scheduled buffer. Unknown handles
    /// are ignored. No completion is reported for stopped buffers.
    fn stop(&mut self, id: HandleId);

    /// Freeze the clock; nothing plays and no time advances.
    fn suspend(&mut self);

    /// Resume the clock exactly where it was frozen.
    fn resume(&mut self);
}

/// Factory creating a fresh sink per session, wired to a completion channel.
pub type SinkFactory = Box<dyn Fn(CompletionTx) -> Result<Box<dyn PlaybackSink>> + Send + Sync>;

/// Observable state of a [`MockPlaybackSink`].
#[derive(Debug, Default)]
pub struct MockSinkState {
    pub now: f64,
    pub suspended: bool,
    /// (handle, start time, duration) of every live buffer.
    pub scheduled: Vec<(HandleId, f64, f64)>,
    /// Handles explicitly stopped.
    pub stopped: Vec<HandleId>,
    next_id: HandleId,
    completion_tx: Option<CompletionTx>,
    pub fail_schedule: bool,
}

/// Shared handle to a mock sink's state, usable after the sink has been
/// moved into the engine.
pub type MockSinkHandle = std::sync::Arc<std::sync::Mutex<MockSinkState>>;

/// Mock playback sink with a manually advanced clock.
pub struct MockPlaybackSink {
    state: MockSinkHandle,
}

impl MockPlaybackSink {
    pub fn new(completion_tx: CompletionTx) -> Self {
        let state = MockSinkState {
            completion_tx: Some(completion_tx),
            ..Default::default()
        };
        Self {
            state: std::sync::Arc::new(std::sync::Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> MockSinkHandle {
        self.state.clone()
    }

    /// Advance the mock clock, completing buffers whose end passed.
    /// Does nothing while suspended, matching a frozen device clock.
    pub fn advance(state: &MockSinkHandle, seconds: f64) {
        let mut state = state.lock().expect("mock sink poisoned");
        if state.suspended {
            return;
        }
        state.now += seconds;
        let now = state.now;
        let mut finished = Vec::new();
        state.scheduled.retain(|&(id, start, duration)| {
            if now >= start + duration {
                finished.push(id);
                false
            } else {
                true
            }
        });
        if let Some(tx) = &state.completion_tx {
            for id in finished {
                let _ = tx.send(id);
            }
        }
    }
}

impl PlaybackSink for MockPlaybackSink {
    fn now(&self) -> f64 {
        self.state.lock().expect("mock sink poisoned").now
    }

    fn schedule(&mut self, chunk: PlaybackChunk, start_at: f64) -> Result<HandleId> {
        let mut state = self.state.lock().expect("mock sink poisoned");
        if state.fail_schedule {
            return Err(ParloError::AudioPlayback {
                message: "mock schedule failure".to_string(),
            });
        }
        let id = state.next_id;
        state.next_id += 1;
        state.scheduled.push((id, start_at, chunk.duration_secs()));
        Ok(id)
    }

    fn stop(&mut self, id: HandleId) {
        let mut state = self.state.lock().expect("mock sink poisoned");
        state.scheduled.retain(|&(entry, _, _)| entry != id);
        state.stopped.push(id);
    }

    fn suspend(&mut self) {
        self.state.lock().expect("mock sink poisoned").suspended = true;
    }

    fn resume(&mut self) {
        self.state.lock().expect("mock sink poisoned").suspended = false;
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_impl::CpalPlaybackSink;

#[cfg(feature = "cpal-audio")]
mod cpal_impl {
    use super::{CompletionTx, HandleId, PlaybackChunk, PlaybackSink};
    use crate::defaults;
    use crate::error::{ParloError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};

    struct Entry {
        id: HandleId,
        /// Absolute start position on the sample clock.
        start: u64,
        samples: Vec<i16>,
    }

    struct Shared {
        /// Samples rendered so far; the sink clock. Frozen while suspended.
        clock_samples: u64,
        suspended: bool,
        entries: Vec<Entry>,
        next_id: HandleId,
        completion_tx: CompletionTx,
    }

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is owned by the sink and only dropped with it;
    /// no stream method is called across threads.
    struct SendableStream(#[allow(dead_code)] cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Real playback through the default output device.
    ///
    /// Runs a 24kHz mono f32 output stream whose callback mixes every
    /// scheduled buffer that overlaps the current sample window. The
    /// sample counter doubles as the monotonic sink clock, so suspending
    /// the callback freezes scheduling time exactly.
    pub struct CpalPlaybackSink {
        shared: Arc<Mutex<Shared>>,
        _stream: SendableStream,
        sample_rate: u32,
    }

    impl CpalPlaybackSink {
        /// Open the default output device at the output rate.
        pub fn new(completion_tx: CompletionTx) -> Result<Self> {
            let host = cpal::default_host();
            let device =
                host.default_output_device()
                    .ok_or_else(|| ParloError::AudioDeviceNotFound {
                        device: "default output".to_string(),
                    })?;

            let sample_rate = defaults::OUTPUT_SAMPLE_RATE;
            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let shared = Arc::new(Mutex::new(Shared {
                clock_samples: 0,
                suspended: false,
                entries: Vec::new(),
                next_id: 0,
                completion_tx,
            }));

            let callback_shared = Arc::clone(&shared);
            let stream = device
                .build_output_stream(
                    &config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render(&callback_shared, out);
                    },
                    |err| {
                        eprintln!("parlo: playback stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| ParloError::AudioPlayback {
                    message: format!("Failed to build output stream: {}", e),
                })?;

            stream.play().map_err(|e| ParloError::AudioPlayback {
                message: format!("Failed to start output stream: {}", e),
            })?;

            Ok(Self {
                shared,
                _stream: SendableStream(stream),
                sample_rate,
            })
        }
    }

    /// Mix scheduled buffers into one output period and advance the clock.
    fn render(shared: &Arc<Mutex<Shared>>, out: &mut [f32]) {
        let Ok(mut state) = shared.lock() else {
            out.fill(0.0);
            return;
        };

        if state.suspended {
            out.fill(0.0);
            return;
        }

        let base = state.clock_samples;
        for (i, slot) in out.iter_mut().enumerate() {
            let t = base + i as u64;
            let mut acc = 0.0f32;
            for entry in &state.entries {
                if t >= entry.start {
                    let idx = (t - entry.start) as usize;
                    if idx < entry.samples.len() {
                        acc += entry.samples[idx] as f32 / 32768.0;
                    }
                }
            }
            *slot = acc.clamp(-1.0, 1.0);
        }
        state.clock_samples = base + out.len() as u64;

        // Report buffers that finished inside this period.
        let now = state.clock_samples;
        let mut finished = Vec::new();
        state
            .entries
            .retain(|entry| {
                if now >= entry.start + entry.samples.len() as u64 {
                    finished.push(entry.id);
                    false
                } else {
                    true
                }
            });
        for id in finished {
            let _ = state.completion_tx.send(id);
        }
    }

    impl PlaybackSink for CpalPlaybackSink {
        fn now(&self) -> f64 {
            let clock = self
                .shared
                .lock()
                .map(|s| s.clock_samples)
                .unwrap_or_default();
            clock as f64 / self.sample_rate as f64
        }

        fn schedule(&mut self, chunk: PlaybackChunk, start_at: f64) -> Result<HandleId> {
            let start = (start_at * self.sample_rate as f64).round() as u64;
            let mut state = self.shared.lock().map_err(|e| ParloError::AudioPlayback {
                message: format!("Failed to lock playback state: {}", e),
            })?;
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                start,
                samples: chunk.samples().to_vec(),
            });
            Ok(id)
        }

        fn stop(&mut self, id: HandleId) {
            if let Ok(mut state) = self.shared.lock() {
                state.entries.retain(|entry| entry.id != id);
            }
        }

        fn suspend(&mut self) {
            if let Ok(mut state) = self.shared.lock() {
                state.suspended = true;
            }
        }

        fn resume(&mut self) {
            if let Ok(mut state) = self.shared.lock() {
                state.suspended = false;
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn shared_with(entries: Vec<Entry>) -> Arc<Mutex<Shared>> {
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            Arc::new(Mutex::new(Shared {
                clock_samples: 0,
                suspended: false,
                entries,
                next_id: 100,
                completion_tx: tx,
            }))
        }

        #[test]
        fn test_render_advances_clock() {
            let shared = shared_with(vec![]);
            let mut out = vec![0.0f32; 64];
            render(&shared, &mut out);
            assert_eq!(shared.lock().unwrap().clock_samples, 64);
        }

        #[test]
        fn test_render_suspended_outputs_silence_and_freezes_clock() {
            let shared = shared_with(vec![Entry {
                id: 1,
                start: 0,
                samples: vec![i16::MAX; 64],
            }]);
            shared.lock().unwrap().suspended = true;

            let mut out = vec![1.0f32; 32];
            render(&shared, &mut out);

            assert!(out.iter().all(|&s| s == 0.0));
            assert_eq!(shared.lock().unwrap().clock_samples, 0);
        }

        #[test]
        fn test_render_mixes_scheduled_entry_at_its_start() {
            let shared = shared_with(vec![Entry {
                id: 1,
                start: 16,
                samples: vec![16384; 16],
            }]);

            let mut out = vec![0.0f32; 32];
            render(&shared, &mut out);

            assert!(out[..16].iter().all(|&s| s == 0.0));
            assert!(out[16..].iter().all(|&s| (s - 0.5).abs() < 0.01));
        }

        #[tokio::test]
        async fn test_render_reports_completion() {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let shared = Arc::new(Mutex::new(Shared {
                clock_samples: 0,
                suspended: false,
                entries: vec![Entry {
                    id: 7,
                    start: 0,
                    samples: vec![0; 16],
                }],
                next_id: 8,
                completion_tx: tx,
            }));

            let mut out = vec![0.0f32; 32];
            render(&shared, &mut out);

            assert_eq!(rx.recv().await, Some(7));
            assert!(shared.lock().unwrap().entries.is_empty());
        }
    }
}
