//! cpal-backed capture and playback
//!
//! cpal streams are not `Send`, so each stream lives on a dedicated thread
//! and talks to the async session through channels: capture pushes completed
//! frames into an unbounded channel, playback drains a shared sample queue
//! from its output callback and plays silence when the queue runs dry.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ::cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info, trace};

use voicelink_media_core::playout::PlayoutSink;
use voicelink_media_core::{AudioFormat, Sample};

use crate::device::FrameChunker;
use crate::error::{AudioError, Result};

/// Frames of backlog the playback queue tolerates before dropping old audio
const MAX_QUEUED_FRAMES: usize = 8;

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / -(i16::MIN as f32)
}

fn stream_config(format: AudioFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channels as u16,
        sample_rate: ::cpal::SampleRate(format.sample_rate.as_hz()),
        buffer_size: ::cpal::BufferSize::Default,
    }
}

/// Running capture stream handing out exact frames of `frame_size` samples
pub struct AudioCapture {
    /// Completed capture frames, oldest first
    pub frames: mpsc::UnboundedReceiver<Vec<Sample>>,
    // Dropping the handle drops this sender, which unblocks and ends the
    // stream thread.
    _stop: std_mpsc::Sender<()>,
}

impl AudioCapture {
    /// Open the default input device and start capturing
    pub fn start(format: AudioFormat, frame_size: usize) -> Result<Self> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("voicelink-capture".to_string())
            .spawn(move || {
                let outcome = build_capture_stream(format, frame_size, frame_tx);
                match outcome {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until the handle is dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                        info!("audio capture stopped");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::Device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Device("capture thread died during setup".to_string()))??;

        Ok(Self {
            frames: frame_rx,
            _stop: stop_tx,
        })
    }
}

fn build_capture_stream(
    format: AudioFormat,
    frame_size: usize,
    frame_tx: mpsc::UnboundedSender<Vec<Sample>>,
) -> Result<::cpal::Stream> {
    let host = ::cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceNotFound("default input".to_string()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let config = stream_config(format);
    let err_fn = |err| error!(error = %err, "audio input stream error");

    let stream = match supported.sample_format() {
        SampleFormat::I16 => {
            let mut chunker = FrameChunker::new(frame_size);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| {
                    for frame in chunker.push(data) {
                        if frame_tx.send(frame).is_err() {
                            trace!("capture consumer gone");
                        }
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::F32 => {
            let mut chunker = FrameChunker::new(frame_size);
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| {
                    let converted: Vec<Sample> = data.iter().copied().map(f32_to_i16).collect();
                    for frame in chunker.push(&converted) {
                        if frame_tx.send(frame).is_err() {
                            trace!("capture consumer gone");
                        }
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(AudioError::UnsupportedFormat(format!(
                "input sample format {other:?}"
            )))
        }
    }
    .map_err(|e| AudioError::Device(e.to_string()))?;

    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    info!(
        sample_rate = format.sample_rate.as_hz(),
        channels = format.channels,
        "audio capture started"
    );
    Ok(stream)
}

/// Running playback stream fed by the playout loop
pub struct AudioPlayback {
    queue: Arc<Mutex<VecDeque<Sample>>>,
    max_queued: usize,
    _stop: std_mpsc::Sender<()>,
}

impl AudioPlayback {
    /// Open the default output device and start playing
    pub fn start(format: AudioFormat, frame_size: usize) -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(
            frame_size * MAX_QUEUED_FRAMES,
        )));
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let callback_queue = queue.clone();
        thread::Builder::new()
            .name("voicelink-playback".to_string())
            .spawn(move || {
                let outcome = build_playback_stream(format, callback_queue);
                match outcome {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = stop_rx.recv();
                        drop(stream);
                        info!("audio playback stopped");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::Device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Device("playback thread died during setup".to_string()))??;

        Ok(Self {
            queue,
            max_queued: frame_size * MAX_QUEUED_FRAMES,
            _stop: stop_tx,
        })
    }
}

impl PlayoutSink for AudioPlayback {
    fn play(&mut self, samples: &[Sample]) -> voicelink_media_core::Result<()> {
        let mut queue = self.queue.lock();

        // If the device fell behind, age out the oldest audio rather than
        // letting latency build up.
        let backlog = queue.len() + samples.len();
        if backlog > self.max_queued {
            let excess = backlog - self.max_queued;
            queue.drain(..excess);
            trace!(dropped = excess, "playback queue overrun");
        }

        queue.extend(samples.iter().copied());
        Ok(())
    }
}

fn build_playback_stream(
    format: AudioFormat,
    queue: Arc<Mutex<VecDeque<Sample>>>,
) -> Result<::cpal::Stream> {
    let host = ::cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let config = stream_config(format);
    let err_fn = |err| error!(error = %err, "audio output stream error");

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &_| {
                let mut queue = queue.lock();
                for slot in data.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0);
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &_| {
                let mut queue = queue.lock();
                for slot in data.iter_mut() {
                    *slot = queue.pop_front().map(i16_to_f32).unwrap_or(0.0);
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::UnsupportedFormat(format!(
                "output sample format {other:?}"
            )))
        }
    }
    .map_err(|e| AudioError::Device(e.to_string()))?;

    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    info!(
        sample_rate = format.sample_rate.as_hz(),
        channels = format.channels,
        "audio playback started"
    );
    Ok(stream)
}
