//! Opus voice codec
//!
//! Wraps the `audiopus` bindings in the VoIP application profile. Opus is
//! the default codec for voicelink sessions: 20ms frames at 48kHz mono fit
//! comfortably in a single datagram at voice bitrates.

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, SampleRate};
use tracing::debug;
use voicelink_media_core::AudioFrame;

use crate::codec::{CodecConfig, CodecType, VoiceCodec};
use crate::error::{AudioError, Result};

/// Largest payload a single encoded Opus frame can occupy
const MAX_OPUS_PAYLOAD: usize = 1275;

/// Opus codec implementation
pub struct OpusCodec {
    config: CodecConfig,
    encoder: Encoder,
    decoder: Decoder,
    frame_size: usize,
}

impl OpusCodec {
    /// Create an Opus codec for the given configuration
    pub fn new(config: CodecConfig) -> Result<Self> {
        let sample_rate = match config.sample_rate {
            8000 => SampleRate::Hz8000,
            12000 => SampleRate::Hz12000,
            16000 => SampleRate::Hz16000,
            24000 => SampleRate::Hz24000,
            48000 => SampleRate::Hz48000,
            other => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "opus does not support {other}Hz"
                )))
            }
        };
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "opus does not support {other} channels"
                )))
            }
        };

        let encoder = Encoder::new(sample_rate, channels, Application::Voip)
            .map_err(|e| AudioError::Codec(e.to_string()))?;
        let decoder =
            Decoder::new(sample_rate, channels).map_err(|e| AudioError::Codec(e.to_string()))?;

        let frame_size = config.frame_size();
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            frame_size,
            "opus codec ready"
        );

        Ok(Self {
            config,
            encoder,
            decoder,
            frame_size,
        })
    }
}

impl VoiceCodec for OpusCodec {
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>> {
        if frame.len() != self.frame_size {
            return Err(AudioError::Codec(format!(
                "expected {} samples, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        let mut out = vec![0u8; MAX_OPUS_PAYLOAD];
        let written = self
            .encoder
            .encode(&frame.samples, &mut out)
            .map_err(|e| AudioError::Codec(e.to_string()))?;
        out.truncate(written);
        Ok(out)
    }

    fn decode(&mut self, data: &[u8]) -> Result<AudioFrame> {
        let mut samples = vec![0i16; self.frame_size];
        let per_channel = self
            .decoder
            .decode(Some(data), &mut samples, false)
            .map_err(|e| AudioError::Codec(e.to_string()))?;
        samples.truncate(per_channel * self.config.channels as usize);
        Ok(AudioFrame::new(samples))
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn codec_type(&self) -> CodecType {
        CodecType::Opus
    }

    fn max_payload_size(&self) -> usize {
        MAX_OPUS_PAYLOAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CodecConfig {
        CodecConfig {
            codec: CodecType::Opus,
            sample_rate: 48000,
            channels: 1,
            frame_duration: Duration::from_millis(20),
        }
    }

    #[test]
    fn encode_produces_a_datagram_sized_payload() {
        let mut codec = OpusCodec::new(config()).unwrap();

        // A quiet 440Hz tone, one 20ms frame.
        let samples: Vec<i16> = (0..960)
            .map(|i| ((i as f32 * 440.0 / 48000.0 * std::f32::consts::TAU).sin() * 2000.0) as i16)
            .collect();

        let payload = codec.encode(&AudioFrame::new(samples)).unwrap();
        assert!(!payload.is_empty());
        assert!(payload.len() <= MAX_OPUS_PAYLOAD);
    }

    #[test]
    fn decode_restores_the_frame_length() {
        let mut codec = OpusCodec::new(config()).unwrap();
        let payload = codec.encode(&AudioFrame::new(vec![0; 960])).unwrap();

        let decoded = codec.decode(&payload).unwrap();
        assert_eq!(decoded.len(), 960);
    }

    #[test]
    fn wrong_frame_length_is_rejected() {
        let mut codec = OpusCodec::new(config()).unwrap();
        assert!(codec.encode(&AudioFrame::new(vec![0; 100])).is_err());
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        let bad = CodecConfig {
            sample_rate: 44100,
            ..config()
        };
        assert!(OpusCodec::new(bad).is_err());
    }
}
