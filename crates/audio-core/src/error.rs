use thiserror::Error;

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Error types for audio operations
#[derive(Debug, Error)]
pub enum AudioError {
    /// Audio device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    Device(String),

    /// Unsupported audio format
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Unsupported codec
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Audio channel closed
    #[error("Audio channel closed")]
    ChannelClosed,
}
