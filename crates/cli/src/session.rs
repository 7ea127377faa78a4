//! Full-duplex voice session
//!
//! Three independent tasks share one UDP socket: capture encodes and sends,
//! receive decodes into the frame store, and the playout loop feeds the
//! output device at its fixed cadence. Teardown aborts each task on its own;
//! none of them hold state the others need for shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use voicelink_audio_core::codec::{CodecConfig, CodecFactory, VoiceCodec};
use voicelink_audio_core::device::cpal::{AudioCapture, AudioPlayback};
use voicelink_media_core::buffer::{FrameStore, FrameStoreConfig};
use voicelink_media_core::packet::{FramePacket, MAX_DATAGRAM_SIZE, SEQ_HEADER_LEN};
use voicelink_media_core::playout::{PlayoutConfig, PlayoutScheduler};
use voicelink_media_core::{AudioFormat, AudioFrame, SampleRate};

/// Everything a session needs to come up
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Local address receiving the peer's audio
    pub listen: SocketAddr,
    /// Remote peer receiving ours
    pub peer: SocketAddr,
    /// Codec configuration shared by both directions
    pub codec: CodecConfig,
    /// Jitter buffer configuration
    pub store: FrameStoreConfig,
    /// Playout loop configuration
    pub playout: PlayoutConfig,
}

/// A running full-duplex voice session
pub struct VoiceSession {
    tasks: Vec<JoinHandle<()>>,
}

impl VoiceSession {
    /// Bind the socket, open the audio devices and start all three tasks
    pub async fn start(config: SessionConfig) -> anyhow::Result<Self> {
        let encoder = CodecFactory::create(config.codec.clone())?;
        let decoder = CodecFactory::create(config.codec.clone())?;
        check_datagram_budget(encoder.as_ref())?;

        let sample_rate = SampleRate::from_hz(config.codec.sample_rate)
            .with_context(|| format!("unsupported sample rate {}", config.codec.sample_rate))?;
        let format = AudioFormat::new(config.codec.channels, sample_rate);
        let frame_size = config.codec.frame_size();

        let socket = Arc::new(
            UdpSocket::bind(config.listen)
                .await
                .with_context(|| format!("failed to bind {}", config.listen))?,
        );
        info!(
            listen = %socket.local_addr()?,
            peer = %config.peer,
            codec = encoder.codec_type().name(),
            "voice session starting"
        );

        let capture = AudioCapture::start(format, frame_size)?;
        let playback = AudioPlayback::start(format, frame_size)?;

        let store = Arc::new(FrameStore::new(config.store.clone()));
        let scheduler = PlayoutScheduler::new(store.clone(), config.playout.clone());

        let send_task = tokio::spawn(send_loop(socket.clone(), config.peer, capture, encoder));
        let recv_task = tokio::spawn(recv_loop(socket, decoder, store));
        let playout_task = tokio::spawn(async move {
            let _ = scheduler.run(playback).await;
        });

        Ok(Self {
            tasks: vec![send_task, recv_task, playout_task],
        })
    }

    /// Tear the session down; each task is aborted independently
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Reject codec configurations whose frames cannot ride one datagram
fn check_datagram_budget(codec: &dyn VoiceCodec) -> anyhow::Result<()> {
    let worst_case = SEQ_HEADER_LEN + codec.max_payload_size();
    if worst_case > MAX_DATAGRAM_SIZE {
        bail!(
            "{} at {}Hz needs up to {} bytes per datagram (limit {}); \
             use a lower sample rate or a compressed codec",
            codec.codec_type().name(),
            codec.config().sample_rate,
            worst_case,
            MAX_DATAGRAM_SIZE
        );
    }
    Ok(())
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    mut capture: AudioCapture,
    mut codec: Box<dyn VoiceCodec>,
) {
    let mut sequence: u16 = 0;

    while let Some(samples) = capture.frames.recv().await {
        let frame = AudioFrame::new(samples);
        let payload = match codec.encode(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "encode failed, dropping frame");
                continue;
            }
        };

        let packet = FramePacket::new(sequence, Bytes::from(payload));
        match socket.send_to(&packet.serialize(), peer).await {
            Ok(_) => trace!(sequence, bytes = packet.size(), "sent frame"),
            Err(e) => warn!(error = %e, "send failed"),
        }
        sequence = sequence.wrapping_add(1);
    }

    debug!("capture stream ended, send loop exiting");
}

async fn recv_loop(socket: Arc<UdpSocket>, mut codec: Box<dyn VoiceCodec>, store: Arc<FrameStore>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "receive error");
                continue;
            }
        };

        let packet = match FramePacket::parse(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(error = %e, %from, "dropping malformed datagram");
                continue;
            }
        };

        let frame = match codec.decode(&packet.payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, sequence = packet.sequence, "decode failed, dropping frame");
                continue;
            }
        };

        store.insert(packet.sequence, frame);
    }
}
