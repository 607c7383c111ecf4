//! Transcript aggregation for streaming transcription deltas.
//!
//! Two independent delta sources feed the aggregator: the service's
//! recognition of the user's speech and its description of its own speech.
//! Deltas accumulate into per-sender buffers; the message at the transcript
//! tail is rewritten in place while a turn is open and finalized when the
//! other sender starts or the turn completes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Model => write!(f, "model"),
        }
    }
}

/// One entry in the conversation transcript.
///
/// `text` is mutable while the message is open; `is_final` moves from false
/// to true exactly once and never reverts. `translations` maps a target
/// language-accent code to translated text and is populated lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: Speaker,
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub translations: HashMap<String, String>,
}

/// Merges streaming deltas into an ordered, mutable-then-final message log.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    messages: Vec<Message>,
    next_id: u64,
    input_buffer: String,
    output_buffer: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an input-transcription delta (the user's speech).
    pub fn input_delta(&mut self, text: &str) {
        self.input_buffer.push_str(text);
        let accumulated = self.input_buffer.clone();
        self.add_or_update(Speaker::User, accumulated, false);
    }

    /// Apply an output-transcription delta (the model's speech).
    ///
    /// The first output delta of a turn finalizes any pending user message
    /// before the model message is opened.
    pub fn output_delta(&mut self, text: &str) {
        if !self.input_buffer.is_empty() {
            let pending = std::mem::take(&mut self.input_buffer);
            self.add_or_update(Speaker::User, pending, true);
        }
        self.output_buffer.push_str(text);
        let accumulated = self.output_buffer.clone();
        self.add_or_update(Speaker::Model, accumulated, false);
    }

    /// Apply a turn-complete signal: finalize whatever is pending on either
    /// side and clear both accumulation buffers.
    pub fn turn_complete(&mut self) {
        if !self.input_buffer.is_empty() {
            let pending = std::mem::take(&mut self.input_buffer);
            self.add_or_update(Speaker::User, pending, true);
        }
        if !self.output_buffer.is_empty() {
            let pending = std::mem::take(&mut self.output_buffer);
            self.add_or_update(Speaker::Model, pending, true);
        }
    }

    /// True if input deltas have accumulated with no turn boundary yet.
    pub fn has_pending_input(&self) -> bool {
        !self.input_buffer.is_empty()
    }

    /// True once any output delta has arrived in the current turn.
    pub fn has_pending_output(&self) -> bool {
        !self.output_buffer.is_empty()
    }

    /// Drop the whole transcript and both buffers. Used when a new session
    /// starts; messages are never deleted otherwise.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.input_buffer.clear();
        self.output_buffer.clear();
    }

    /// Clear only the accumulation buffers, keeping the transcript.
    pub fn clear_buffers(&mut self) {
        self.input_buffer.clear();
        self.output_buffer.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Full copy of the transcript for outward publication.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Record a translation for a message, keyed by target language-accent.
    pub fn set_translation(&mut self, id: u64, target: &str, text: String) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.translations.insert(target.to_string(), text);
        }
    }

    /// Rewrite the tail message in place when it belongs to `sender` and is
    /// still open; otherwise append a new message. `is_final` only ever
    /// moves false to true through this path.
    fn add_or_update(&mut self, sender: Speaker, text: String, is_final: bool) {
        match self.messages.last_mut() {
            Some(last) if last.sender == sender && !last.is_final => {
                last.text = text;
                last.is_final = is_final;
            }
            _ => {
                let id = self.next_id;
                self.next_id += 1;
                self.messages.push(Message {
                    id,
                    sender,
                    text,
                    is_final,
                    translations: HashMap::new(),
                });
            }
        }
    }
}
