//! # Audio core library for the voicelink project
//!
//! `audio-core` provides the collaborators around voicelink's media core:
//!
//! - Voice codecs behind the [`VoiceCodec`](codec::VoiceCodec) trait
//!   (Opus via `audiopus`, and L16 linear PCM)
//! - Audio device capture and playback built on `cpal`
//! - A deterministic mock device for tests
//!
//! The media core never touches a device or a codec directly; everything
//! here speaks [`AudioFrame`](voicelink_media_core::AudioFrame) and raw
//! sample chunks at the boundary.

pub mod codec;
pub mod device;
pub mod error;

pub use codec::{CodecConfig, CodecFactory, CodecType, VoiceCodec};
pub use error::{AudioError, Result};
