//! Conversions between float microphone samples, 16-bit PCM, base64 wire
//! strings and playable WAV containers.

use std::io::Cursor;

use base64::prelude::*;
use bytes::Bytes;
use thiserror::Error;

use super::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};

/// Number of samples converted per block before handing bytes to the encoder.
///
/// A block is `2 * ENCODE_BLOCK_SAMPLES` bytes, which must stay a multiple of
/// three so intermediate blocks never produce base64 padding.
pub const ENCODE_BLOCK_SAMPLES: usize = 3 * 8192;

/// Size of the canonical RIFF/WAVE header.
pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("PCM buffer has odd length {0}, expected whole 16-bit samples")]
    OddLength(usize),

    #[error("PCM buffer is empty")]
    Empty,

    #[error("PCM buffer of {0} bytes does not fit in a WAV container")]
    TooLarge(usize),

    #[error("Invalid base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid WAV container: {0}")]
    InvalidContainer(String),

    #[error("Unsupported WAV format: {0}")]
    UnsupportedFormat(String),
}

/// Converts one float sample to 16-bit PCM.
///
/// Negative values scale by 32768 and non-negative values by 32767, so -1.0
/// maps to `i16::MIN` and 1.0 to `i16::MAX`. Out-of-range input is clamped.
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Inverse of [`float_to_pcm16`].
#[inline]
pub fn pcm16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32768.0
    } else {
        f32::from(sample) / 32767.0
    }
}

/// Encodes float samples as base64 of 16-bit little-endian PCM.
///
/// Large buffers are processed block by block; the result is identical to
/// encoding the whole PCM buffer in one call.
pub fn encode_for_wire(samples: &[f32]) -> String {
    let mut encoded = String::with_capacity((samples.len() * 2).div_ceil(3) * 4);
    let mut block = Vec::with_capacity(samples.len().min(ENCODE_BLOCK_SAMPLES) * 2);

    for chunk in samples.chunks(ENCODE_BLOCK_SAMPLES) {
        block.clear();
        for &sample in chunk {
            block.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
        }
        BASE64_STANDARD.encode_string(&block, &mut encoded);
    }

    encoded
}

/// Decodes a base64 wire string into raw PCM bytes.
pub fn decode_from_wire(encoded: &str) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(BASE64_STANDARD.decode(encoded)?))
}

/// Reinterprets little-endian PCM bytes as signed samples.
pub fn pcm_to_samples(pcm: &[u8]) -> Result<Vec<i16>, CodecError> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }

    Ok(pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Writes the 44-byte RIFF/WAVE header for PCM data of `data_len` bytes.
fn wav_header(data_len: u32) -> [u8; WAV_HEADER_LEN] {
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let byte_rate = SAMPLE_RATE * u32::from(block_align);

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Wraps raw PCM in a WAV container any standard decoder can play.
///
/// Empty input is refused rather than producing a zero-sample file.
pub fn build_playable_container(pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm.is_empty() {
        return Err(CodecError::Empty);
    }
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or(CodecError::TooLarge(pcm.len()))?;

    let mut container = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    container.extend_from_slice(&wav_header(data_len));
    // Wire PCM is already little-endian, so the sample bytes go in unchanged.
    container.extend_from_slice(pcm);
    Ok(container)
}

/// Decodes a 16-bit integer WAV container back into samples.
pub fn decode_container(container: &[u8]) -> Result<Vec<i16>, CodecError> {
    let reader = hound::WavReader::new(Cursor::new(container))
        .map_err(|e| CodecError::InvalidContainer(e.to_string()))?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
        return Err(CodecError::UnsupportedFormat(format!(
            "{:?} {}-bit",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CodecError::InvalidContainer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_pcm16_asymmetric_scaling() {
        assert_eq!(float_to_pcm16(-1.0), i16::MIN);
        assert_eq!(float_to_pcm16(1.0), i16::MAX);
        assert_eq!(float_to_pcm16(0.0), 0);
        assert_eq!(float_to_pcm16(0.5), 16383);
        assert_eq!(float_to_pcm16(-0.5), -16384);
    }

    #[test]
    fn test_float_to_pcm16_clamps() {
        assert_eq!(float_to_pcm16(2.5), i16::MAX);
        assert_eq!(float_to_pcm16(-3.0), i16::MIN);
        assert_eq!(float_to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_encode_small_buffer() {
        // 1.0 -> 0x7FFF, -1.0 -> 0x8000
        let encoded = encode_for_wire(&[1.0, -1.0]);
        assert_eq!(
            BASE64_STANDARD.decode(&encoded).unwrap(),
            vec![0xFF, 0x7F, 0x00, 0x80]
        );
    }

    #[test]
    fn test_encode_empty_buffer() {
        assert_eq!(encode_for_wire(&[]), "");
    }

    #[test]
    fn test_block_encoding_matches_one_shot() {
        // Spans several blocks and ends on a partial one.
        let samples: Vec<f32> = (0..ENCODE_BLOCK_SAMPLES * 3 + 1001)
            .map(|i| ((i as f32) * 0.001).sin())
            .collect();

        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &s in &samples {
            pcm.extend_from_slice(&float_to_pcm16(s).to_le_bytes());
        }

        assert_eq!(encode_for_wire(&samples), BASE64_STANDARD.encode(&pcm));
    }

    #[test]
    fn test_silence_encodes_to_zero_bytes() {
        let encoded = encode_for_wire(&vec![0.0; 4096]);
        let pcm = decode_from_wire(&encoded).unwrap();
        assert_eq!(pcm.len(), 8192);
        assert!(pcm.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_from_wire_rejects_garbage() {
        assert!(matches!(
            decode_from_wire("not base64!!"),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn test_pcm_to_samples() {
        let samples = pcm_to_samples(&[0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80]).unwrap();
        assert_eq!(samples, vec![1, -1, i16::MIN]);

        assert!(matches!(
            pcm_to_samples(&[0x01, 0x02, 0x03]),
            Err(CodecError::OddLength(3))
        ));
    }

    #[test]
    fn test_container_header_fields() {
        let pcm = vec![0u8; 10];
        let wav = build_playable_container(&pcm).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + 10);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 46);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 2);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 10);
    }

    #[test]
    fn test_container_rejects_empty_and_odd() {
        assert!(matches!(build_playable_container(&[]), Err(CodecError::Empty)));
        assert!(matches!(
            build_playable_container(&[0, 0, 0]),
            Err(CodecError::OddLength(3))
        ));
    }

    #[test]
    fn test_round_trip_through_container() {
        let input: Vec<f32> = vec![0.0, 0.25, -0.25, 0.999, -1.0, 1.0, 0.1234, -0.9876];

        let wire = encode_for_wire(&input);
        let pcm = decode_from_wire(&wire).unwrap();
        let wav = build_playable_container(&pcm).unwrap();
        let decoded = decode_container(&wav).unwrap();

        assert_eq!(decoded.len(), input.len());
        for (original, sample) in input.iter().zip(decoded) {
            assert_eq!(sample, float_to_pcm16(*original));
            let restored = pcm16_to_float(sample);
            assert!(
                (restored - original).abs() <= 1.0 / 32767.0,
                "{original} restored as {restored}"
            );
        }
    }

    #[test]
    fn test_decode_container_rejects_garbage() {
        assert!(matches!(
            decode_container(b"definitely not a wav file"),
            Err(CodecError::InvalidContainer(_))
        ));
    }
}
