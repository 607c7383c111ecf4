//! Audio capture and playback.

pub mod capture;
pub mod playback;
pub mod scheduler;

use crate::defaults;

/// One outbound capture frame: fixed-length PCM16 mono at the input rate,
/// opaque little-endian bytes once encoded for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    /// Encode i16 samples as little-endian PCM bytes.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// MIME type describing the frame payload.
    pub fn mime_type(&self) -> &'static str {
        defaults::CAPTURE_MIME_TYPE
    }

    /// Number of samples in the frame.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Convert floating-point samples to 16-bit signed PCM.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_encodes_little_endian() {
        let frame = AudioFrame::from_samples(&[1, -1, 256]);
        assert_eq!(frame.data(), &[0x01, 0x00, 0xFF, 0xFF, 0x00, 0x01]);
        assert_eq!(frame.sample_count(), 3);
    }

    #[test]
    fn test_frame_mime_type() {
        let frame = AudioFrame::from_samples(&[]);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        let converted = f32_to_i16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(converted[0], 0);
        assert_eq!(converted[1], i16::MAX);
        assert_eq!(converted[3], i16::MAX);
        assert_eq!(converted[4], -i16::MAX);
    }

    #[test]
    fn test_f32_to_i16_scales_midrange() {
        let converted = f32_to_i16(&[0.5]);
        assert_eq!(converted[0], (0.5 * i16::MAX as f32) as i16);
    }
}
