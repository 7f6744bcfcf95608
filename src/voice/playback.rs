//! Audio playback to speakers

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Destination for synthesized audio
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play a WAV buffer to completion
    ///
    /// # Errors
    ///
    /// Returns error if the buffer cannot be decoded or played
    async fn play_wav(&self, wav: Vec<u8>) -> Result<()>;
}

/// Plays audio to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );
        Ok(Self)
    }
}

#[async_trait]
impl PlaybackSink for AudioPlayback {
    async fn play_wav(&self, wav: Vec<u8>) -> Result<()> {
        let (samples, sample_rate) = decode_wav_f32(&wav)?;
        tokio::task::spawn_blocking(move || play_samples_blocking(samples, sample_rate))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Decode a WAV buffer to mono f32 samples
///
/// # Errors
///
/// Returns error if the buffer is not a readable integer PCM WAV
pub fn decode_wav_f32(wav: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported wav: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let channels = usize::from(spec.channels.max(1));
    let interleaved: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    // Downmix by averaging channels
    #[allow(clippy::cast_precision_loss)]
    let samples = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect();

    Ok((samples, spec.sample_rate))
}

/// Play samples in a blocking manner
fn play_samples_blocking(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = usize::from(config.channels);

    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let (done_tx, done_rx) = std::sync::mpsc::sync_channel::<()>(1);

    let samples_clone = Arc::clone(&samples);
    let position_clone = Arc::clone(&position);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = position_clone.lock() else {
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let sample = samples_clone.get(*pos).copied().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                    if *pos < samples_clone.len() {
                        *pos += 1;
                    } else {
                        let _ = done_tx.try_send(());
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Wait for playback to finish, with slack for device latency
    let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate.max(1));
    let timeout = std::time::Duration::from_millis(duration_ms + 500);
    let _ = done_rx.recv_timeout(timeout);

    // Small delay to ensure audio finishes
    std::thread::sleep(std::time::Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}
