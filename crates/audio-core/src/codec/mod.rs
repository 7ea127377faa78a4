//! Voice codecs
//!
//! Encoding and decoding between PCM frames and the compressed payloads
//! carried on the wire. The jitter buffer only ever sees decoded frames;
//! codecs live entirely on the socket side of the session.

use std::time::Duration;

use voicelink_media_core::AudioFrame;

use crate::error::Result;

pub mod l16;
#[cfg(feature = "codec-opus")]
pub mod opus;

/// Voice codecs supported by voicelink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// Opus - variable bitrate, 8-48kHz, the default for voice
    Opus,
    /// L16 - uncompressed big-endian linear PCM
    L16,
}

impl CodecType {
    /// Get the default sample rate for this codec
    pub fn default_sample_rate(&self) -> u32 {
        match self {
            CodecType::Opus => 48000,
            CodecType::L16 => 16000,
        }
    }

    /// Get the codec name
    pub fn name(&self) -> &'static str {
        match self {
            CodecType::Opus => "opus",
            CodecType::L16 => "L16",
        }
    }
}

/// Configuration for codec encoding/decoding
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Codec type
    pub codec: CodecType,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u8,
    /// Duration of one frame
    pub frame_duration: Duration,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codec: CodecType::Opus,
            sample_rate: 48000,
            channels: 1,
            frame_duration: Duration::from_millis(20),
        }
    }
}

impl CodecConfig {
    /// Samples in one frame, across all channels
    pub fn frame_size(&self) -> usize {
        let per_channel =
            (self.sample_rate as u128 * self.frame_duration.as_millis() / 1000) as usize;
        per_channel * self.channels as usize
    }
}

/// Trait for voice codec implementations
pub trait VoiceCodec: Send {
    /// Encode one PCM frame to its compressed wire payload
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>>;

    /// Decode a wire payload to one PCM frame
    fn decode(&mut self, data: &[u8]) -> Result<AudioFrame>;

    /// Get codec configuration
    fn config(&self) -> &CodecConfig;

    /// Get codec type
    fn codec_type(&self) -> CodecType;

    /// Upper bound on the encoded payload size in bytes
    fn max_payload_size(&self) -> usize;
}

/// Factory for creating codec instances
pub struct CodecFactory;

impl CodecFactory {
    /// Create a new codec instance with the specified configuration
    pub fn create(config: CodecConfig) -> Result<Box<dyn VoiceCodec>> {
        match config.codec {
            #[cfg(feature = "codec-opus")]
            CodecType::Opus => Ok(Box::new(opus::OpusCodec::new(config)?)),
            #[cfg(not(feature = "codec-opus"))]
            CodecType::Opus => Err(crate::error::AudioError::UnsupportedCodec(
                "opus support not compiled in".to_string(),
            )),
            CodecType::L16 => Ok(Box::new(l16::L16Codec::new(config)?)),
        }
    }

    /// Get all supported codecs
    pub fn supported_codecs() -> Vec<CodecType> {
        vec![
            #[cfg(feature = "codec-opus")]
            CodecType::Opus,
            CodecType::L16,
        ]
    }
}
