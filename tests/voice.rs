//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use fairy::voice::{
    AudioFrame, AudioFrameSource, FRAME_SAMPLES, Framer, PcmFormat, SAMPLE_RATE, SegmenterConfig,
    SegmenterState, SpeechSegmenter, Utterance, chunked_base64_decode, chunked_base64_encode,
    decode_wav, decode_wav_f32, encode_wav, pcm_to_samples, samples_to_pcm,
};

mod common;

use common::{ScriptedFrameSource, silence_frames, speech_frames, utterance_frames};

const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Generate sine wave audio samples
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn segment(segmenter: &mut SpeechSegmenter, frames: &[AudioFrame]) -> Vec<Utterance> {
    frames.iter().filter_map(|f| segmenter.push(f)).collect()
}

#[test]
fn test_single_utterance_from_speech_run() {
    let mut segmenter = SpeechSegmenter::default();
    let utterances = segment(&mut segmenter, &utterance_frames());

    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].pcm.len(), 20 * FRAME_BYTES);
    assert_eq!(utterances[0].format, PcmFormat::SPEECH);
    assert_eq!(utterances[0].duration_ms(), 600);
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_short_blip_is_ignored() {
    let mut segmenter = SpeechSegmenter::default();
    let mut frames = speech_frames(4);
    frames.extend(silence_frames(40));

    assert!(segment(&mut segmenter, &frames).is_empty());
    assert!(segmenter.finish().is_empty());
}

#[test]
fn test_pause_inside_utterance() {
    let mut frames = speech_frames(12);
    frames.extend(silence_frames(5));
    frames.extend(speech_frames(3));
    frames.extend(silence_frames(30));

    let mut filtered = SpeechSegmenter::default();
    let utterances = segment(&mut filtered, &frames);
    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].pcm.len(), 15 * FRAME_BYTES);

    let mut unfiltered = SpeechSegmenter::new(SegmenterConfig {
        filter_silence: false,
        ..SegmenterConfig::default()
    });
    let utterances = segment(&mut unfiltered, &frames);
    assert_eq!(utterances.len(), 1);
    // the inner pause is kept, trailing silence is not
    assert_eq!(utterances[0].pcm.len(), 20 * FRAME_BYTES);
}

#[test]
fn test_back_to_back_utterances() {
    let mut frames = utterance_frames();
    frames.extend(utterance_frames());

    let mut segmenter = SpeechSegmenter::default();
    let utterances = segment(&mut segmenter, &frames);
    assert_eq!(utterances.len(), 2);
    assert_eq!(utterances[0], utterances[1]);
}

#[test]
fn test_finish_flushes_open_utterance() {
    let mut segmenter = SpeechSegmenter::default();
    assert!(segment(&mut segmenter, &speech_frames(15)).is_empty());
    assert!(segmenter.is_speaking());

    let utterance = segmenter.finish();
    assert_eq!(utterance.pcm.len(), 15 * FRAME_BYTES);
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_framer_detects_speech_in_sine() {
    let mut framer = Framer::new(0.03);

    let loud = framer.feed(&generate_sine_samples(440.0, 0.3, 0.5));
    assert_eq!(loud.len(), 10);
    assert!(loud.iter().all(|f| f.is_speech));

    let quiet = framer.feed(&vec![0.0; FRAME_SAMPLES * 4]);
    assert_eq!(quiet.len(), 4);
    assert!(quiet.iter().all(|f| !f.is_speech));
}

#[tokio::test]
async fn test_scripted_source_feeds_segmenter() {
    let mut source = ScriptedFrameSource::new([utterance_frames()]);
    let mut frames = source.start().unwrap();

    let mut segmenter = SpeechSegmenter::default();
    let mut utterance = None;
    while let Some(frame) = frames.recv().await {
        if let Some(u) = segmenter.push(&frame) {
            utterance = Some(u);
        }
    }
    source.stop();

    assert!(utterance.is_some());
    assert!(!source.is_running());
    assert!(source.start().is_err());
}

#[test]
fn test_wav_readable_by_hound() {
    let samples: Vec<i16> = (0..1600).map(|i| (i % 200) * 100 - 10_000).collect();
    let wav = encode_wav(&samples_to_pcm(&samples), PcmFormat::SPEECH);

    let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let read: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(read, samples);
}

#[test]
fn test_wav_decode_matches_encode() {
    let samples = vec![0, 1, -1, i16::MAX, i16::MIN];
    let pcm = samples_to_pcm(&samples);
    let wav = encode_wav(&pcm, PcmFormat::REALTIME_OUTPUT);

    let decoded = decode_wav(&wav).unwrap();
    assert_eq!(decoded.format, PcmFormat::REALTIME_OUTPUT);
    assert_eq!(pcm_to_samples(&decoded.pcm), samples);

    let (float, rate) = decode_wav_f32(&wav).unwrap();
    assert_eq!(rate, 24000);
    assert_eq!(float.len(), samples.len());
    assert!(float.iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn test_long_buffer_base64_chunks() {
    let bytes: Vec<u8> = (0..100_000u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
    let chunks = chunked_base64_encode(&bytes, 32 * 1024).unwrap();

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunked_base64_decode(&chunks).unwrap(), bytes);
}
