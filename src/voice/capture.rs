//! Audio capture from microphone

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::frame::{AudioFrame, AudioFrameSource, FrameReceiver, SAMPLE_RATE};
use crate::{Error, Result};

/// Samples per frame (30ms at 16kHz)
pub const FRAME_SAMPLES: usize = 480;

/// Frame length in milliseconds
const FRAME_MS: u32 = 30;

/// Default RMS energy above which a frame counts as speech
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Captures frames from the default input device
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread that
/// is parked until `stop` is called.
pub struct MicrophoneSource {
    energy_threshold: f32,
    sample_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    /// Create a capture source with the given speech energy threshold
    #[must_use]
    pub const fn new(energy_threshold: f32) -> Self {
        Self {
            energy_threshold,
            sample_rate: SAMPLE_RATE,
            stop_tx: None,
            worker: None,
        }
    }

    /// Capture at `sample_rate` instead of the 16kHz speech rate
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

impl Default for MicrophoneSource {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

impl AudioFrameSource for MicrophoneSource {
    fn start(&mut self) -> Result<FrameReceiver> {
        if self.is_running() {
            return Err(Error::Capture("capture already running".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let threshold = self.energy_threshold;
        let sample_rate = self.sample_rate;

        let worker = std::thread::Builder::new()
            .name("fairy-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(frame_tx, threshold, sample_rate) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park until stop is requested or the source is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })
            .map_err(|e| Error::Capture(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(Error::Capture("capture thread exited during setup".to_string()));
            }
        }

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        tracing::debug!("audio capture started");
        Ok(frame_rx)
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the default input device and start pushing frames
fn open_input_stream(
    frames: mpsc::UnboundedSender<AudioFrame>,
    energy_threshold: f32,
    sample_rate: u32,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Capture(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| Error::Capture("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    let mut framer = Framer::with_sample_rate(energy_threshold, sample_rate);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in framer.feed(data) {
                    // Receiver gone means the session ended; frames are moot
                    let _ = frames.send(frame);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))?;

    stream.play().map_err(|e| Error::Capture(e.to_string()))?;
    Ok(stream)
}

/// Slices a continuous f32 stream into fixed-size flagged frames
#[derive(Debug)]
pub struct Framer {
    energy_threshold: f32,
    sample_rate: u32,
    frame_len: usize,
    buffer: Vec<f32>,
}

impl Framer {
    /// Create a 16kHz framer with the given speech energy threshold
    #[must_use]
    pub fn new(energy_threshold: f32) -> Self {
        Self::with_sample_rate(energy_threshold, SAMPLE_RATE)
    }

    /// Create a framer producing 30ms frames at `sample_rate`
    #[must_use]
    pub fn with_sample_rate(energy_threshold: f32, sample_rate: u32) -> Self {
        let frame_len = (sample_rate * FRAME_MS / 1000).max(1) as usize;
        Self {
            energy_threshold,
            sample_rate,
            frame_len,
            buffer: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Append samples and drain every complete frame
    pub fn feed(&mut self, data: &[f32]) -> Vec<AudioFrame> {
        self.buffer.extend_from_slice(data);

        let complete = self.buffer.len() / self.frame_len;
        let mut frames = Vec::with_capacity(complete);
        for chunk in self.buffer.chunks_exact(self.frame_len) {
            let is_speech = calculate_energy(chunk) > self.energy_threshold;
            let samples = chunk.iter().copied().map(to_i16).collect();
            frames.push(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                is_speech,
            });
        }
        self.buffer.drain(..complete * self.frame_len);
        frames
    }
}

/// Convert f32 [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
