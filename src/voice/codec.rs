//! PCM, WAV and base64 conversions
//!
//! The WAV writer emits the canonical 44-byte RIFF/WAVE PCM header byte for
//! byte, since playback clients and the transcription service both depend on
//! that exact layout.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use super::frame::PcmFormat;
use crate::{Error, Result};

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// Upper bound for a single base64 block sent over the wire
pub const MAX_BASE64_CHUNK: usize = 32 * 1024;

/// Decoded WAV payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavAudio {
    /// Declared format
    pub format: PcmFormat,
    /// Raw sample bytes
    pub pcm: Vec<u8>,
}

/// Convert i16 samples to little-endian bytes
#[must_use]
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Convert little-endian bytes to i16 samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Build the 44-byte WAV header for `data_len` bytes of PCM
#[must_use]
pub fn wav_header(format: PcmFormat, data_len: u32) -> [u8; WAV_HEADER_LEN] {
    let mut header = [0u8; WAV_HEADER_LEN];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&format.bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());

    header
}

/// Wrap raw PCM in a WAV container
#[must_use]
pub fn encode_wav(pcm: &[u8], format: PcmFormat) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    wav.extend_from_slice(&wav_header(format, data_len));
    wav.extend_from_slice(pcm);
    wav
}

/// Parse a canonical PCM WAV container
///
/// # Errors
///
/// Returns `Error::Audio` if the header is missing, not PCM, or the payload is
/// shorter than declared
pub fn decode_wav(bytes: &[u8]) -> Result<WavAudio> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(Error::Audio(format!(
            "wav too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(Error::Audio("missing RIFF/WAVE magic".to_string()));
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return Err(Error::Audio("unexpected chunk layout".to_string()));
    }

    let audio_format = read_u16(bytes, 20);
    if audio_format != 1 {
        return Err(Error::Audio(format!(
            "unsupported audio format {audio_format}"
        )));
    }

    let format = PcmFormat {
        channels: read_u16(bytes, 22),
        sample_rate: read_u32(bytes, 24),
        bit_depth: read_u16(bytes, 34),
    };

    let data_len = read_u32(bytes, 40) as usize;
    let payload = &bytes[WAV_HEADER_LEN..];
    if payload.len() < data_len {
        return Err(Error::Audio(format!(
            "wav payload truncated: declared {data_len}, found {}",
            payload.len()
        )));
    }

    Ok(WavAudio {
        format,
        pcm: payload[..data_len].to_vec(),
    })
}

/// Split bytes into blocks of at most `chunk_size` and base64-encode each
///
/// # Errors
///
/// Returns `Error::Config` if `chunk_size` is zero
pub fn chunked_base64_encode(bytes: &[u8], chunk_size: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(Error::Config("base64 chunk size must be positive".to_string()));
    }

    Ok(bytes.chunks(chunk_size).map(|c| B64.encode(c)).collect())
}

/// Decode and concatenate base64 blocks
///
/// # Errors
///
/// Returns `Error::Audio` if any block is not valid base64
pub fn chunked_base64_decode<S: AsRef<str>>(chunks: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in chunks {
        let decoded = B64
            .decode(chunk.as_ref())
            .map_err(|e| Error::Audio(format!("invalid base64 chunk: {e}")))?;
        out.extend_from_slice(&decoded);
    }
    Ok(out)
}

/// Base64-encode a single buffer
#[must_use]
pub fn base64_encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode a single base64 buffer
///
/// # Errors
///
/// Returns `Error::Audio` if the input is not valid base64
pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    B64.decode(text)
        .map_err(|e| Error::Audio(format!("invalid base64: {e}")))
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
