//! Offline loopback transport.
//!
//! Echoes captured audio straight back as synthesized output, resampled
//! from the capture rate to the playback rate. No network, no API key:
//! this exists so `parlo run` can exercise the full capture →
//! session → playback path on a machine with nothing but a sound card.

use crate::audio::AudioFrame;
use crate::channel::{ChannelConfig, ChannelConnector, LiveChannel, ServerEvent};
use crate::defaults;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Connector whose channels mirror input audio back as output.
pub struct LoopbackConnector;

impl LoopbackConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelConnector for LoopbackConnector {
    async fn connect(
        &self,
        _config: &ChannelConfig,
    ) -> Result<(Arc<dyn LiveChannel>, UnboundedReceiver<ServerEvent>)> {
        let (tx, rx) = unbounded_channel();
        let _ = tx.send(ServerEvent::Opened);
        Ok((Arc::new(LoopbackChannel { event_tx: tx }), rx))
    }
}

struct LoopbackChannel {
    event_tx: UnboundedSender<ServerEvent>,
}

#[async_trait]
impl LiveChannel for LoopbackChannel {
    async fn send_realtime_audio(&self, frame: AudioFrame) -> Result<()> {
        let samples = decode_pcm16(frame.data());
        let resampled = resample(
            &samples,
            defaults::INPUT_SAMPLE_RATE,
            defaults::OUTPUT_SAMPLE_RATE,
        );
        let _ = self.event_tx.send(ServerEvent::Audio {
            data: AudioFrame::from_samples(&resampled).into_data(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _ = self.event_tx.send(ServerEvent::Closed);
        Ok(())
    }
}

fn decode_pcm16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Linear-interpolation resample. Quality is irrelevant here; it only has
/// to sound recognizably like the input.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let step = from_rate as f64 / to_rate as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let base = pos as usize;
            let frac = pos - base as f64;
            let a = f64::from(samples[base.min(samples.len() - 1)]);
            let b = f64::from(samples[(base + 1).min(samples.len() - 1)]);
            (a + (b - a) * frac) as i16
        })
        .collect()
}
