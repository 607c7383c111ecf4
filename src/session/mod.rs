//! Live conversation session: public surface.
//!
//! A session is owned by a single engine task; [`SessionController`] is the
//! handle the rest of the program talks to. Commands travel
//! over a channel and block on a reply, so callers see ordinary `Result`s
//! while all state lives on one logical thread.

mod engine;

use crate::audio::capture::CaptureFactory;
use crate::audio::playback::SinkFactory;
use crate::channel::ChannelConnector;
use crate::defaults;
use crate::error::{ParloError, Result};
use crate::transcript::Message;
use engine::{Command, Engine, EngineEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Connecting,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Connecting => "connecting",
            Status::Listening => "listening",
            Status::Processing => "processing",
            Status::Speaking => "speaking",
            Status::Error => "error",
        }
    }

    /// True for every state in which a channel is (or is being) held open.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Status::Connecting | Status::Listening | Status::Processing | Status::Speaking
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outward notifications from the engine, delivered over a broadcast
/// channel so any number of observers can subscribe.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusUpdated(Status),
    TranscriptUpdated(Vec<Message>),
    Error(String),
}

/// Everything the engine needs injected: the channel transport and the two
/// audio factories. Factories rather than instances because each session
/// gets a fresh device handle.
pub struct SessionDeps {
    pub connector: Arc<dyn ChannelConnector>,
    pub capture: CaptureFactory,
    pub playback: SinkFactory,
    pub debounce: Duration,
    pub frame_samples: usize,
}

impl SessionDeps {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        capture: CaptureFactory,
        playback: SinkFactory,
    ) -> Self {
        Self {
            connector,
            capture,
            playback,
            debounce: Duration::from_millis(defaults::PROCESSING_DEBOUNCE_MS),
            frame_samples: defaults::CAPTURE_FRAME_SAMPLES,
        }
    }
}

/// Handle to a running session engine.
///
/// Dropping the controller shuts the engine down.
pub struct SessionController {
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Spawn the engine task and return its handle.
    pub fn spawn(deps: SessionDeps) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(64);
        let engine = Engine::new(deps, events_tx.clone(), events_rx, broadcast_tx.clone());
        tokio::spawn(engine.run());
        Self {
            events_tx,
            broadcast_tx,
        }
    }

    /// Subscribe to status, transcript, and error notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Begin a session in the given language. Valid only while idle or in
    /// the error state; the previous transcript is cleared.
    ///
    /// Returns once the channel is open; the status moves to `Listening`
    /// when the service confirms readiness.
    pub async fn start(&self, language_accent: &str, voice: Option<&str>) -> Result<()> {
        self.request(|reply| Command::Start {
            language_accent: language_accent.to_string(),
            voice: voice.map(str::to_string),
            reply,
        })
        .await?
    }

    /// End the session: stop capture, silence playback, close the channel.
    /// Stopping an idle session is a no-op.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    /// Toggle the mute flag; returns the new value. Muted sessions keep
    /// capturing but drop every frame before transmission.
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleMute { reply }).await?
    }

    /// Toggle the hold flag; returns the new value. Held sessions freeze
    /// playback in place and drop capture frames until released.
    pub async fn toggle_hold(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleHold { reply }).await?
    }

    pub async fn status(&self) -> Result<Status> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn transcript(&self) -> Result<Vec<Message>> {
        self.request(|reply| Command::Transcript { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events_tx
            .send(EngineEvent::Command(make(reply_tx)))
            .map_err(|_| engine_gone())?;
        reply_rx.await.map_err(|_| engine_gone())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let _ = self.events_tx.send(EngineEvent::Command(Command::Shutdown));
    }
}

fn engine_gone() -> ParloError {
    ParloError::Other("session engine has shut down".to_string())
}
