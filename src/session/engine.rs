//! The session engine task.
//!
//! All session state is owned by one task and mutated only from its event
//! loop. Everything asynchronous around it (the server event stream, the
//! capture pump, debounce timers, playback completions) is reduced to
//! messages on a single queue, tagged with the session generation so that
//! events from a torn-down session are discarded instead of corrupting the
//! next one.

use super::{SessionDeps, SessionEvent, Status};
use crate::audio::AudioFrame;
use crate::audio::capture::CaptureSource;
use crate::audio::playback::{HandleId, PlaybackChunk};
use crate::audio::scheduler::PlaybackScheduler;
use crate::channel::{ChannelConfig, LiveChannel, ServerEvent};
use crate::defaults;
use crate::error::{ParloError, Result};
use crate::lang;
use crate::transcript::{Message, TranscriptAggregator};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Requests from the controller, each carrying a reply slot.
pub(crate) enum Command {
    Start {
        language_accent: String,
        voice: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleMute {
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleHold {
        reply: oneshot::Sender<Result<bool>>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Shutdown,
}

/// Everything that can wake the engine. The `u64` is the session generation
/// the event belongs to; stale generations are dropped on arrival.
pub(crate) enum EngineEvent {
    Command(Command),
    Server(u64, ServerEvent),
    CaptureFrame(u64, AudioFrame),
    CaptureFailed(u64, String),
    DebounceFired(u64, u64),
    PlaybackDone(u64, HandleId),
}

pub(crate) struct Engine {
    deps: SessionDeps,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    generation: u64,
    status: Status,
    transcript: TranscriptAggregator,
    channel: Option<Arc<dyn LiveChannel>>,
    capture_stop: Option<Arc<AtomicBool>>,
    scheduler: Option<PlaybackScheduler>,
    muted: bool,
    held: bool,
    debounce_seq: u64,
}

impl Engine {
    pub(crate) fn new(
        deps: SessionDeps,
        events_tx: mpsc::UnboundedSender<EngineEvent>,
        events_rx: mpsc::UnboundedReceiver<EngineEvent>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            deps,
            events_tx,
            events_rx,
            broadcast_tx,
            generation: 0,
            status: Status::Idle,
            transcript: TranscriptAggregator::new(),
            channel: None,
            capture_stop: None,
            scheduler: None,
            muted: false,
            held: false,
            debounce_seq: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                EngineEvent::Command(Command::Shutdown) => {
                    self.teardown();
                    break;
                }
                EngineEvent::Command(command) => self.handle_command(command).await,
                EngineEvent::Server(generation, server_event) => {
                    if generation == self.generation {
                        self.handle_server_event(server_event);
                    }
                }
                EngineEvent::CaptureFrame(generation, frame) => {
                    if generation == self.generation {
                        self.handle_capture_frame(frame);
                    }
                }
                EngineEvent::CaptureFailed(generation, message) => {
                    if generation == self.generation {
                        self.teardown();
                        self.fail_session(&message);
                    }
                }
                EngineEvent::DebounceFired(generation, seq) => {
                    if generation == self.generation {
                        self.handle_debounce(seq);
                    }
                }
                EngineEvent::PlaybackDone(generation, id) => {
                    if generation == self.generation {
                        self.handle_playback_done(id);
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                language_accent,
                voice,
                reply,
            } => {
                let result = self.handle_start(&language_accent, voice.as_deref()).await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.handle_stop());
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(self.handle_toggle_mute());
            }
            Command::ToggleHold { reply } => {
                let _ = reply.send(self.handle_toggle_hold());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status);
            }
            Command::Transcript { reply } => {
                let _ = reply.send(self.transcript.snapshot());
            }
            // Handled in `run` before dispatch.
            Command::Shutdown => {}
        }
    }

    async fn handle_start(&mut self, language_accent: &str, voice: Option<&str>) -> Result<()> {
        if self.status.is_active() {
            return Err(ParloError::InvalidState {
                expected: "idle".to_string(),
                actual: self.status.to_string(),
            });
        }

        let default_voice = lang::default_voice(language_accent).ok_or_else(|| {
            ParloError::ConfigInvalidValue {
                key: "language_accent".to_string(),
                message: format!("unknown language-accent pair {language_accent:?}"),
            }
        })?;
        let voice = voice.unwrap_or(default_voice).to_string();

        self.generation += 1;
        let generation = self.generation;
        self.transcript.clear();
        self.publish_transcript();
        self.set_status(Status::Connecting);

        // Capture first, so a denied device surfaces before any network work.
        let capture = match (self.deps.capture)().and_then(|mut source| {
            source.start()?;
            Ok(source)
        }) {
            Ok(source) => source,
            Err(err) => {
                let err = ParloError::PermissionDenied {
                    message: err.to_string(),
                };
                self.fail_session(&err.to_string());
                return Err(err);
            }
        };

        let config = ChannelConfig::new(&voice, &lang::system_instruction(language_accent));
        let (channel, server_rx) = match self.deps.connector.connect(&config).await {
            Ok(pair) => pair,
            Err(err) => {
                let mut capture = capture;
                if let Err(stop_err) = capture.stop() {
                    eprintln!("parlo: failed to stop capture: {stop_err}");
                }
                let err = match err {
                    open @ ParloError::ChannelOpen { .. } => open,
                    other => ParloError::ChannelOpen {
                        message: other.to_string(),
                    },
                };
                self.fail_session(&err.to_string());
                return Err(err);
            }
        };

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let sink = match (self.deps.playback)(completion_tx) {
            Ok(sink) => sink,
            Err(err) => {
                let mut capture = capture;
                if let Err(stop_err) = capture.stop() {
                    eprintln!("parlo: failed to stop capture: {stop_err}");
                }
                tokio::spawn(async move {
                    let _ = channel.close().await;
                });
                let err = ParloError::AudioPlayback {
                    message: err.to_string(),
                };
                self.fail_session(&err.to_string());
                return Err(err);
            }
        };

        self.scheduler = Some(PlaybackScheduler::new(sink));
        self.channel = Some(channel);
        self.muted = false;
        self.held = false;
        self.spawn_completion_forwarder(generation, completion_rx);
        self.spawn_server_forwarder(generation, server_rx);
        self.spawn_capture_pump(generation, capture);
        Ok(())
    }

    /// Idempotent: stopping an idle session is a no-op, and a session in
    /// the error state is reset to idle.
    fn handle_stop(&mut self) -> Result<()> {
        if !self.status.is_active() {
            if self.status == Status::Error {
                self.set_status(Status::Idle);
            }
            return Ok(());
        }
        self.teardown();
        self.set_status(Status::Idle);
        Ok(())
    }

    fn handle_toggle_mute(&mut self) -> Result<bool> {
        self.require_active()?;
        self.muted = !self.muted;
        Ok(self.muted)
    }

    fn handle_toggle_hold(&mut self) -> Result<bool> {
        self.require_active()?;
        self.held = !self.held;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_held(self.held);
        }
        Ok(self.held)
    }

    fn require_active(&self) -> Result<()> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(ParloError::InvalidState {
                expected: "an active session".to_string(),
                actual: self.status.to_string(),
            })
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Opened => {
                if self.status == Status::Connecting {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::InputTranscription { text } => {
                self.transcript.input_delta(&text);
                self.publish_transcript();
                self.arm_debounce();
            }
            ServerEvent::OutputTranscription { text } => {
                self.transcript.output_delta(&text);
                self.publish_transcript();
                // The first output delta means the model has started its
                // turn, even when its audio has not arrived yet.
                if matches!(self.status, Status::Listening | Status::Processing) {
                    self.set_status(Status::Speaking);
                }
            }
            ServerEvent::TurnComplete => {
                // Any armed debounce refers to input that just got
                // finalized; invalidate it.
                self.debounce_seq += 1;
                self.transcript.turn_complete();
                self.publish_transcript();
                if self.status.is_active() {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::Audio { data } => self.handle_audio(data),
            ServerEvent::Interrupted => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.interrupt();
                }
                if self.status.is_active() {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::Error { message } => {
                self.teardown();
                self.fail_session(&message);
            }
            ServerEvent::Closed => {
                self.teardown();
                self.set_status(Status::Idle);
            }
        }
    }

    fn handle_audio(&mut self, data: Vec<u8>) {
        let chunk = match PlaybackChunk::decode(&data, defaults::OUTPUT_SAMPLE_RATE) {
            Ok(chunk) => chunk,
            Err(err) => {
                eprintln!("parlo: dropping audio chunk: {err}");
                return;
            }
        };
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        if let Err(err) = scheduler.enqueue(chunk) {
            eprintln!("parlo: playback scheduling failed: {err}");
            return;
        }
        if matches!(self.status, Status::Listening | Status::Processing) {
            self.set_status(Status::Speaking);
        }
    }

    fn handle_playback_done(&mut self, id: HandleId) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        scheduler.mark_finished(id);
        if scheduler.live_count() == 0 && self.status == Status::Speaking {
            self.set_status(Status::Listening);
        }
    }

    fn handle_capture_frame(&mut self, frame: AudioFrame) {
        if self.muted || self.held {
            return;
        }
        if !matches!(
            self.status,
            Status::Listening | Status::Processing | Status::Speaking
        ) {
            return;
        }
        let Some(channel) = self.channel.clone() else {
            return;
        };
        // Fire and forget: a failed send must not stall the event loop.
        tokio::spawn(async move {
            if let Err(err) = channel.send_realtime_audio(frame).await {
                eprintln!("parlo: realtime audio send failed: {err}");
            }
        });
    }

    /// Schedule a processing check. Only the most recently armed timer for
    /// the current session may fire.
    fn arm_debounce(&mut self) {
        self.debounce_seq += 1;
        let seq = self.debounce_seq;
        let generation = self.generation;
        let delay = self.deps.debounce;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineEvent::DebounceFired(generation, seq));
        });
    }

    fn handle_debounce(&mut self, seq: u64) {
        if seq != self.debounce_seq {
            return;
        }
        if self.status == Status::Listening
            && self.transcript.has_pending_input()
            && !self.transcript.has_pending_output()
        {
            self.set_status(Status::Processing);
        }
    }

    /// Release every per-session resource and invalidate in-flight events.
    /// Leaves the status untouched; callers decide between idle and error.
    fn teardown(&mut self) {
        self.generation += 1;
        if let Some(stop) = self.capture_stop.take() {
            stop.store(true, Ordering::SeqCst);
        }
        if let Some(channel) = self.channel.take() {
            tokio::spawn(async move {
                if let Err(err) = channel.close().await {
                    eprintln!("parlo: channel close failed: {err}");
                }
            });
        }
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.interrupt();
        }
        self.muted = false;
        self.held = false;
        self.transcript.clear_buffers();
    }

    fn spawn_server_forwarder(&self, generation: u64, mut rx: mpsc::UnboundedReceiver<ServerEvent>) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tx.send(EngineEvent::Server(generation, event)).is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_completion_forwarder(&self, generation: u64, mut rx: mpsc::UnboundedReceiver<HandleId>) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                if tx.send(EngineEvent::PlaybackDone(generation, id)).is_err() {
                    break;
                }
            }
        });
    }

    /// Poll the capture source and slice its output into fixed-size frames.
    /// The pump exits on the stop flag or a read error and always stops the
    /// device on the way out.
    fn spawn_capture_pump(&mut self, generation: u64, mut source: Box<dyn CaptureSource>) {
        let stop = Arc::new(AtomicBool::new(false));
        self.capture_stop = Some(stop.clone());
        let tx = self.events_tx.clone();
        let frame_samples = self.deps.frame_samples;
        tokio::spawn(async move {
            let mut pending: Vec<i16> = Vec::new();
            'pump: while !stop.load(Ordering::SeqCst) {
                match source.read_samples() {
                    Ok(samples) => {
                        pending.extend_from_slice(&samples);
                        while pending.len() >= frame_samples {
                            let frame: Vec<i16> = pending.drain(..frame_samples).collect();
                            let event = EngineEvent::CaptureFrame(generation, AudioFrame::from_samples(&frame));
                            if tx.send(event).is_err() {
                                break 'pump;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(EngineEvent::CaptureFailed(generation, err.to_string()));
                        break 'pump;
                    }
                }
                tokio::time::sleep(Duration::from_millis(defaults::CAPTURE_POLL_INTERVAL_MS)).await;
            }
            if let Err(err) = source.stop() {
                eprintln!("parlo: failed to stop capture: {err}");
            }
        });
    }

    fn set_status(&mut self, status: Status) {
        if self.status == status {
            return;
        }
        self.status = status;
        let _ = self.broadcast_tx.send(SessionEvent::StatusUpdated(status));
    }

    fn publish_transcript(&self) {
        let _ = self
            .broadcast_tx
            .send(SessionEvent::TranscriptUpdated(self.transcript.snapshot()));
    }

    fn fail_session(&mut self, message: &str) {
        let _ = self
            .broadcast_tx
            .send(SessionEvent::Error(message.to_string()));
        self.set_status(Status::Error);
    }
}
