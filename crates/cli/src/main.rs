//! voicelink — point-to-point voice link over UDP
//!
//! Captures the default microphone, encodes each frame, and sends it to the
//! peer; received frames pass through a jitter buffer that feeds the default
//! speaker at a fixed cadence.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voicelink_audio_core::codec::{CodecConfig, CodecType};
use voicelink_media_core::buffer::FrameStoreConfig;
use voicelink_media_core::playout::PlayoutConfig;

mod session;
use session::{SessionConfig, VoiceSession};

/// Point-to-point voice link over UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Peer address to send audio to (host:port)
    #[arg(short, long)]
    peer: SocketAddr,

    /// Local address to receive audio on
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    listen: SocketAddr,

    /// Voice codec
    #[arg(long, value_enum, default_value = "opus")]
    codec: CodecArg,

    /// Audio sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Frame duration in milliseconds
    #[arg(long, default_value_t = 20)]
    frame_ms: u64,

    /// Sequence span kept in the jitter buffer before eviction
    #[arg(long, default_value_t = 300)]
    buffer_span: u16,

    /// Sequence distance behind the cursor treated as a stream restart
    #[arg(long, default_value_t = 100)]
    overflow_threshold: u16,

    /// Milliseconds of dead air before the jitter buffer resets
    #[arg(long, default_value_t = 2000)]
    stale_timeout_ms: u64,

    /// Consecutive missed frames tolerated before skipping ahead
    #[arg(long, default_value_t = 10)]
    miss_threshold: u32,

    /// How many sequence numbers ahead to search when skipping
    #[arg(long, default_value_t = 50)]
    search_window: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CodecArg {
    /// Opus voice codec (default)
    Opus,
    /// Uncompressed 16-bit linear PCM
    L16,
}

impl From<CodecArg> for CodecType {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Opus => CodecType::Opus,
            CodecArg::L16 => CodecType::L16,
        }
    }
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let frame_duration = Duration::from_millis(self.frame_ms);
        let codec = CodecConfig {
            codec: self.codec.into(),
            sample_rate: self.sample_rate,
            channels: 1,
            frame_duration,
        };

        SessionConfig {
            listen: self.listen,
            peer: self.peer,
            store: FrameStoreConfig {
                buffer_span: self.buffer_span,
                overflow_threshold: self.overflow_threshold,
            },
            playout: PlayoutConfig {
                frame_duration,
                samples_per_frame: codec.frame_size(),
                stale_timeout: Duration::from_millis(self.stale_timeout_ms),
                miss_threshold: self.miss_threshold,
                search_window: self.search_window,
            },
            codec,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let session = VoiceSession::start(args.session_config()).await?;

    info!("voicelink running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    session.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_tuning() {
        let args = Args::parse_from(["voicelink", "--peer", "10.0.0.2:9000"]);
        let config = args.session_config();

        assert_eq!(config.store.buffer_span, 300);
        assert_eq!(config.store.overflow_threshold, 100);
        assert_eq!(config.playout.miss_threshold, 10);
        assert_eq!(config.playout.search_window, 50);
        assert_eq!(config.playout.stale_timeout, Duration::from_secs(2));
        assert_eq!(config.playout.frame_duration, Duration::from_millis(20));
        // 20ms mono at 48kHz
        assert_eq!(config.playout.samples_per_frame, 960);
    }

    #[test]
    fn knobs_are_exposed_on_the_command_line() {
        let args = Args::parse_from([
            "voicelink",
            "--peer",
            "10.0.0.2:9000",
            "--listen",
            "0.0.0.0:7000",
            "--codec",
            "l16",
            "--sample-rate",
            "16000",
            "--miss-threshold",
            "4",
        ]);
        let config = args.session_config();

        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.codec.codec, CodecType::L16);
        assert_eq!(config.codec.sample_rate, 16000);
        assert_eq!(config.playout.miss_threshold, 4);
        assert_eq!(config.playout.samples_per_frame, 320);
    }
}
