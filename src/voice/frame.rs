//! Audio frames, utterances and the frame source contract

use tokio::sync::mpsc;

use crate::Result;

/// Sample rate for speech capture (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Sample rate of realtime model audio output
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Receiving end of a frame source
pub type FrameReceiver = mpsc::UnboundedReceiver<AudioFrame>;

/// PCM layout of a sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u16,
    /// Interleaved channel count
    pub channels: u16,
}

impl PcmFormat {
    /// 16kHz mono 16-bit, the capture format
    pub const SPEECH: Self = Self {
        sample_rate: SAMPLE_RATE,
        bit_depth: 16,
        channels: 1,
    };

    /// 24kHz mono 16-bit, the realtime output format
    pub const REALTIME_OUTPUT: Self = Self {
        sample_rate: OUTPUT_SAMPLE_RATE,
        bit_depth: 16,
        channels: 1,
    };

    /// Bytes per second of audio
    #[must_use]
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bit_depth as u32 / 8
    }

    /// Bytes per interleaved sample frame
    #[must_use]
    pub const fn block_align(&self) -> u16 {
        self.channels * self.bit_depth / 8
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::SPEECH
    }
}

/// One fixed-size block of captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Signed 16-bit samples in capture order
    pub samples: Vec<i16>,
    /// Samples per second
    pub sample_rate: u32,
    /// Voice activity flag for this frame
    pub is_speech: bool,
}

impl AudioFrame {
    /// Create a frame at the speech sample rate
    #[must_use]
    pub const fn new(samples: Vec<i16>, is_speech: bool) -> Self {
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
            is_speech,
        }
    }

    /// Little-endian PCM bytes of this frame
    #[must_use]
    pub fn to_pcm(&self) -> Vec<u8> {
        super::codec::samples_to_pcm(&self.samples)
    }
}

/// A finalized span of speech
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Utterance {
    /// Raw little-endian sample bytes in arrival order
    pub pcm: Vec<u8>,
    /// Layout of `pcm`
    pub format: PcmFormat,
}

impl Utterance {
    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        let byte_rate = u64::from(self.format.byte_rate());
        if byte_rate == 0 {
            return 0;
        }
        self.pcm.len() as u64 * 1000 / byte_rate
    }

    /// Wrap the payload in a WAV container
    #[must_use]
    pub fn to_wav(&self) -> Vec<u8> {
        super::codec::encode_wav(&self.pcm, self.format)
    }
}

/// A live producer of audio frames
///
/// `start` hands back the receiving end of an unbounded channel so that the
/// producer never blocks or drops frames. `stop` ends the stream; the receiver
/// then yields `None` once drained.
pub trait AudioFrameSource: Send {
    /// Begin producing frames
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the device cannot be opened
    fn start(&mut self) -> Result<FrameReceiver>;

    /// Stop producing frames
    fn stop(&mut self);

    /// Whether frames are currently being produced
    fn is_running(&self) -> bool;
}
