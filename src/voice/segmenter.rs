//! Utterance segmentation from voice-activity-flagged frames
//!
//! Onset is confirmed after a run of consecutive speech frames; the utterance
//! ends once enough silence-flagged audio has accumulated.

use super::frame::{AudioFrame, PcmFormat, Utterance};

/// Default number of consecutive speech frames that confirm onset
pub const DEFAULT_ONSET_FRAMES: usize = 10;

/// Default silence hold in milliseconds
pub const DEFAULT_SILENCE_HOLD_MS: u32 = 800;

/// Segmentation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Consecutive speech frames required to start an utterance
    pub onset_frames: usize,
    /// Silence duration that ends an utterance
    pub silence_hold_ms: u32,
    /// Drop silence frames from the utterance payload
    pub filter_silence: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            onset_frames: DEFAULT_ONSET_FRAMES,
            silence_hold_ms: DEFAULT_SILENCE_HOLD_MS,
            filter_silence: true,
        }
    }
}

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech seen, onset not yet confirmed
    Pending,
    /// Inside an utterance
    Speaking,
}

/// Buffers frames into utterances
#[derive(Debug)]
pub struct SpeechSegmenter {
    config: SegmenterConfig,
    state: SegmenterState,
    format: PcmFormat,
    /// Speech frames seen before onset was confirmed
    pending: Vec<u8>,
    pending_frames: usize,
    /// Confirmed utterance bytes
    speech: Vec<u8>,
    /// Silence held back until speech resumes (unfiltered mode)
    gap: Vec<u8>,
    silence_samples: usize,
}

impl SpeechSegmenter {
    /// Create a segmenter
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SegmenterState::Idle,
            format: PcmFormat::SPEECH,
            pending: Vec::new(),
            pending_frames: 0,
            speech: Vec::new(),
            gap: Vec::new(),
            silence_samples: 0,
        }
    }

    /// Feed one frame; returns an utterance when a span completes
    pub fn push(&mut self, frame: &AudioFrame) -> Option<Utterance> {
        self.format.sample_rate = frame.sample_rate;

        match self.state {
            SegmenterState::Idle | SegmenterState::Pending => {
                if frame.is_speech {
                    self.pending.extend_from_slice(&frame.to_pcm());
                    self.pending_frames += 1;
                    self.state = SegmenterState::Pending;

                    if self.pending_frames >= self.config.onset_frames {
                        tracing::debug!(frames = self.pending_frames, "speech onset confirmed");
                        self.speech = std::mem::take(&mut self.pending);
                        self.pending_frames = 0;
                        self.silence_samples = 0;
                        self.state = SegmenterState::Speaking;
                    }
                } else if self.state == SegmenterState::Pending {
                    tracing::trace!(frames = self.pending_frames, "speech run broken before onset");
                    self.pending.clear();
                    self.pending_frames = 0;
                    self.state = SegmenterState::Idle;
                }
                None
            }
            SegmenterState::Speaking => {
                if frame.is_speech {
                    if !self.gap.is_empty() {
                        let gap = std::mem::take(&mut self.gap);
                        self.speech.extend_from_slice(&gap);
                    }
                    self.speech.extend_from_slice(&frame.to_pcm());
                    self.silence_samples = 0;
                    return None;
                }

                if !self.config.filter_silence {
                    self.gap.extend_from_slice(&frame.to_pcm());
                }
                self.silence_samples += frame.samples.len();

                tracing::trace!(
                    buffer_len = self.speech.len(),
                    silence = self.silence_samples,
                    "speaking state"
                );

                if self.silence_samples >= self.silence_hold_samples() {
                    let utterance = self.take_utterance();
                    tracing::debug!(
                        bytes = utterance.pcm.len(),
                        duration_ms = utterance.duration_ms(),
                        "utterance complete"
                    );
                    return Some(utterance);
                }
                None
            }
        }
    }

    /// Finalize whatever has been accumulated
    ///
    /// Yields an empty utterance if onset was never confirmed.
    pub fn finish(&mut self) -> Utterance {
        if self.state == SegmenterState::Speaking {
            self.take_utterance()
        } else {
            self.reset();
            Utterance {
                pcm: Vec::new(),
                format: self.format,
            }
        }
    }

    /// Discard all buffered audio and wait for the next onset
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.pending.clear();
        self.pending_frames = 0;
        self.speech.clear();
        self.gap.clear();
        self.silence_samples = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == SegmenterState::Speaking
    }

    /// Segmentation parameters
    #[must_use]
    pub const fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    fn silence_hold_samples(&self) -> usize {
        let samples = u64::from(self.config.silence_hold_ms) * u64::from(self.format.sample_rate) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }

    fn take_utterance(&mut self) -> Utterance {
        let pcm = std::mem::take(&mut self.speech);
        self.reset();
        Utterance {
            pcm,
            format: self.format,
        }
    }
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(value: i16) -> AudioFrame {
        AudioFrame::new(vec![value; 160], true)
    }

    fn silence() -> AudioFrame {
        AudioFrame::new(vec![0; 160], false)
    }

    fn config(onset: usize) -> SegmenterConfig {
        SegmenterConfig {
            onset_frames: onset,
            silence_hold_ms: 30,
            filter_silence: true,
        }
    }

    #[test]
    fn short_speech_run_is_discarded() {
        let mut segmenter = SpeechSegmenter::new(config(3));
        assert!(segmenter.push(&speech(1)).is_none());
        assert!(segmenter.push(&speech(2)).is_none());
        assert_eq!(segmenter.state(), SegmenterState::Pending);

        assert!(segmenter.push(&silence()).is_none());
        assert_eq!(segmenter.state(), SegmenterState::Idle);
        assert!(segmenter.finish().is_empty());
    }

    #[test]
    fn onset_includes_confirming_frames() {
        let mut segmenter = SpeechSegmenter::new(config(2));
        segmenter.push(&speech(1));
        segmenter.push(&speech(2));
        assert!(segmenter.is_speaking());

        let utterance = segmenter.finish();
        assert_eq!(utterance.pcm.len(), 2 * 160 * 2);
        assert_eq!(&utterance.pcm[..2], &1i16.to_le_bytes());
    }

    #[test]
    fn silence_hold_ends_utterance() {
        // 30ms at 16kHz = 480 samples = 3 silent frames of 160
        let mut segmenter = SpeechSegmenter::new(config(1));
        segmenter.push(&speech(5));
        assert!(segmenter.push(&silence()).is_none());
        assert!(segmenter.push(&silence()).is_none());
        let utterance = segmenter.push(&silence()).unwrap();

        assert_eq!(utterance.pcm.len(), 160 * 2);
        assert_eq!(segmenter.state(), SegmenterState::Idle);
    }

    #[test]
    fn resumed_speech_resets_silence_counter() {
        let mut segmenter = SpeechSegmenter::new(config(1));
        segmenter.push(&speech(1));
        segmenter.push(&silence());
        segmenter.push(&silence());
        segmenter.push(&speech(2));
        segmenter.push(&silence());
        assert!(segmenter.push(&silence()).is_none());
        assert!(segmenter.push(&silence()).is_some());
    }

    #[test]
    fn unfiltered_mode_keeps_interior_silence_only() {
        let mut segmenter = SpeechSegmenter::new(SegmenterConfig {
            filter_silence: false,
            ..config(1)
        });
        segmenter.push(&speech(1));
        segmenter.push(&silence());
        segmenter.push(&speech(2));
        segmenter.push(&silence());
        segmenter.push(&silence());
        let utterance = segmenter.push(&silence()).unwrap();

        // speech + interior silence + speech; trailing hold is dropped
        assert_eq!(utterance.pcm.len(), 3 * 160 * 2);
    }

    #[test]
    fn restartable_after_emit() {
        let mut segmenter = SpeechSegmenter::new(config(1));
        for _ in 0..2 {
            segmenter.push(&speech(3));
            segmenter.push(&silence());
            segmenter.push(&silence());
            assert!(segmenter.push(&silence()).is_some());
        }
    }
}
