//! Voice processing module
//!
//! Handles audio capture, utterance segmentation, WAV/base64 encoding,
//! transcription and playback.

mod capture;
pub mod codec;
mod frame;
mod playback;
mod segmenter;
mod stt;

pub use capture::{
    DEFAULT_ENERGY_THRESHOLD, FRAME_SAMPLES, Framer, MicrophoneSource, calculate_energy,
};
pub use codec::{
    MAX_BASE64_CHUNK, WAV_HEADER_LEN, WavAudio, chunked_base64_decode, chunked_base64_encode,
    decode_wav, encode_wav, pcm_to_samples, samples_to_pcm,
};
pub use frame::{
    AudioFrame, AudioFrameSource, FrameReceiver, OUTPUT_SAMPLE_RATE, PcmFormat, SAMPLE_RATE,
    Utterance,
};
pub use playback::{AudioPlayback, PlaybackSink, decode_wav_f32};
pub use segmenter::{
    DEFAULT_ONSET_FRAMES, DEFAULT_SILENCE_HOLD_MS, SegmenterConfig, SegmenterState,
    SpeechSegmenter,
};
pub use stt::{SpeechToText, SttProvider, Transcriber};
