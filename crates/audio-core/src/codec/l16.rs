//! L16 linear PCM codec
//!
//! Uncompressed 16-bit big-endian samples (RFC 3551 section 4.5.11). Mostly
//! useful on fast links and in tests; at 48kHz a 20ms L16 frame no longer
//! fits a single UDP datagram, so the session layer rejects that pairing.

use voicelink_media_core::AudioFrame;

use crate::codec::{CodecConfig, CodecType, VoiceCodec};
use crate::error::{AudioError, Result};

/// L16 codec implementation
pub struct L16Codec {
    config: CodecConfig,
    frame_size: usize,
}

impl L16Codec {
    /// Create an L16 codec for the given configuration
    pub fn new(config: CodecConfig) -> Result<Self> {
        let frame_size = config.frame_size();
        if frame_size == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "L16 frame of zero samples ({}Hz / {:?})",
                config.sample_rate, config.frame_duration
            )));
        }
        Ok(Self { config, frame_size })
    }
}

impl VoiceCodec for L16Codec {
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>> {
        if frame.len() != self.frame_size {
            return Err(AudioError::Codec(format!(
                "expected {} samples, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        let mut out = Vec::with_capacity(frame.len() * 2);
        for sample in &frame.samples {
            out.extend_from_slice(&sample.to_be_bytes());
        }
        Ok(out)
    }

    fn decode(&mut self, data: &[u8]) -> Result<AudioFrame> {
        if data.len() % 2 != 0 || data.len() / 2 != self.frame_size {
            return Err(AudioError::Codec(format!(
                "expected {} bytes of L16 data, got {}",
                self.frame_size * 2,
                data.len()
            )));
        }

        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(AudioFrame::new(samples))
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn codec_type(&self) -> CodecType {
        CodecType::L16
    }

    fn max_payload_size(&self) -> usize {
        self.frame_size * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CodecConfig {
        CodecConfig {
            codec: CodecType::L16,
            sample_rate: 8000,
            channels: 1,
            frame_duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn encode_then_decode_is_lossless() {
        let mut codec = L16Codec::new(config()).unwrap();
        let frame = AudioFrame::new(vec![0, 1, -1, i16::MAX, i16::MIN, 256, -257, 7]);

        let encoded = codec.encode(&frame).unwrap();
        assert_eq!(encoded.len(), 16);

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn wrong_frame_length_is_rejected() {
        let mut codec = L16Codec::new(config()).unwrap();
        assert!(codec.encode(&AudioFrame::new(vec![0; 3])).is_err());
        assert!(codec.decode(&[0u8; 15]).is_err());
        assert!(codec.decode(&[0u8; 18]).is_err());
    }
}
