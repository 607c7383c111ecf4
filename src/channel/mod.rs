//! Remote session channel boundary.
//!
//! The bidirectional event stream to the inference service is an external
//! collaborator: this module defines the seam the session engine consumes —
//! the outbound calls, the inbound event set, and the setup configuration —
//! plus a mock transport for tests. A concrete network transport plugs in
//! by implementing [`LiveChannel`] and [`ChannelConnector`].

pub mod loopback;

use crate::audio::AudioFrame;
use crate::defaults;
use crate::error::{ParloError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Inbound events from the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The channel is open and ready for realtime audio.
    Opened,
    /// A fragment of the service's recognition of the user's speech.
    InputTranscription { text: String },
    /// A fragment of the service's description of its own speech.
    OutputTranscription { text: String },
    /// The current turn ended.
    TurnComplete,
    /// An inline synthesized speech payload: PCM16 mono at the output rate.
    Audio { data: Vec<u8> },
    /// The service detected the user speaking over queued model audio.
    Interrupted,
    /// Channel-level runtime error; the session must tear down.
    Error { message: String },
    /// The channel closed.
    Closed,
}

/// Configuration sent when the channel is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

impl ChannelConfig {
    pub fn new(voice: &str, system_instruction: &str) -> Self {
        Self {
            model: defaults::LIVE_MODEL.to_string(),
            voice: voice.to_string(),
            system_instruction: system_instruction.to_string(),
        }
    }

    /// Setup payload for the live connection: audio response modality,
    /// both transcription directions, the prebuilt voice, and the system
    /// instruction.
    pub fn setup_payload(&self) -> serde_json::Value {
        json!({
            "model": self.model,
            "config": {
                "responseModalities": ["AUDIO"],
                "inputAudioTranscription": {},
                "outputAudioTranscription": {},
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                },
                "systemInstruction": self.system_instruction,
            }
        })
    }
}

/// Outbound operations on an open channel.
///
/// The handle is single-owner on the closing side: only the session
/// controller closes it, exactly once. Sends are fire-and-forget and may
/// overlap freely.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Send one capture frame as an opaque realtime payload.
    async fn send_realtime_audio(&self, frame: AudioFrame) -> Result<()>;

    /// Close the channel. Implementations tolerate repeated calls.
    async fn close(&self) -> Result<()>;
}

/// Opens channels. The session controller calls this once per session.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel with the given configuration, returning the outbound
    /// handle and the inbound event stream.
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> Result<(Arc<dyn LiveChannel>, UnboundedReceiver<ServerEvent>)>;
}

// ── Mock transport ───────────────────────────────────────────────────────

/// Mock channel recording outbound traffic for assertions.
pub struct MockLiveChannel {
    sent_frames: std::sync::Mutex<Vec<AudioFrame>>,
    close_count: std::sync::atomic::AtomicUsize,
    fail_sends: bool,
}

impl MockLiveChannel {
    fn new(fail_sends: bool) -> Self {
        Self {
            sent_frames: std::sync::Mutex::new(Vec::new()),
            close_count: std::sync::atomic::AtomicUsize::new(0),
            fail_sends,
        }
    }

    pub fn sent_frame_count(&self) -> usize {
        self.sent_frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveChannel for MockLiveChannel {
    async fn send_realtime_audio(&self, frame: AudioFrame) -> Result<()> {
        if self.fail_sends {
            return Err(ParloError::ChannelRuntime {
                message: "mock send failure".to_string(),
            });
        }
        if let Ok(mut frames) = self.sent_frames.lock() {
            frames.push(frame);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// Mock connector that hands out [`MockLiveChannel`]s and lets tests inject
/// inbound events after the session has connected.
pub struct MockConnector {
    inner: std::sync::Mutex<MockConnectorInner>,
    fail_connect: bool,
    auto_open: bool,
    fail_sends: bool,
}

#[derive(Default)]
struct MockConnectorInner {
    event_tx: Option<UnboundedSender<ServerEvent>>,
    channel: Option<Arc<MockLiveChannel>>,
    last_config: Option<ChannelConfig>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(MockConnectorInner::default()),
            fail_connect: false,
            auto_open: true,
            fail_sends: false,
        }
    }

    /// Make `connect` fail, simulating an unreachable service.
    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Do not emit `Opened` automatically; the test drives it.
    pub fn with_manual_open(mut self) -> Self {
        self.auto_open = false;
        self
    }

    /// Make every realtime send fail.
    pub fn with_send_failures(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Inject an inbound event into the connected session.
    pub fn emit(&self, event: ServerEvent) {
        let inner = self.inner.lock().expect("mock connector poisoned");
        if let Some(tx) = &inner.event_tx {
            let _ = tx.send(event);
        }
    }

    /// The channel handed out by the last `connect`, for assertions.
    pub fn channel(&self) -> Option<Arc<MockLiveChannel>> {
        self.inner
            .lock()
            .expect("mock connector poisoned")
            .channel
            .clone()
    }

    /// The configuration from the last `connect`.
    pub fn last_config(&self) -> Option<ChannelConfig> {
        self.inner
            .lock()
            .expect("mock connector poisoned")
            .last_config
            .clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> Result<(Arc<dyn LiveChannel>, UnboundedReceiver<ServerEvent>)> {
        if self.fail_connect {
            return Err(ParloError::ChannelOpen {
                message: "mock connect refused".to_string(),
            });
        }

        let (tx, rx) = unbounded_channel();
        let channel = Arc::new(MockLiveChannel::new(self.fail_sends));

        {
            let mut inner = self.inner.lock().expect("mock connector poisoned");
            inner.event_tx = Some(tx.clone());
            inner.channel = Some(channel.clone());
            inner.last_config = Some(config.clone());
        }

        if self.auto_open {
            let _ = tx.send(ServerEvent::Opened);
        }

        Ok((channel, rx))
    }
}
