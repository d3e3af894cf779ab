use base64::Engine;
use sentio_voice::AudioBuffer;
use serde::Deserialize;

use crate::protocol::{ErrorCode, RpcError};

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;
pub const DEFAULT_CHANNELS: u16 = 1;
const MAX_AUDIO_B64_BYTES: usize = 6 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct AudioPayload {
    pub audio_b64: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub sample_rate_hz: Option<u32>,
    #[serde(default)]
    pub channels: Option<u16>,
}

impl AudioPayload {
    pub fn format_or_default(&self) -> &str {
        self.format.as_deref().unwrap_or("f32le")
    }

    pub fn sample_rate_hz_or_default(&self) -> u32 {
        self.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ)
    }

    pub fn channels_or_default(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }
}

/// Decode a mono payload at any positive sample rate
pub fn decode_audio_buffer(payload: &AudioPayload) -> Result<AudioBuffer, RpcError> {
    let sample_rate = payload.sample_rate_hz_or_default();
    if sample_rate == 0 {
        return Err(RpcError::new(
            ErrorCode::InvalidParams,
            "sample_rate_hz must be greater than 0",
        ));
    }

    if payload.channels_or_default() != DEFAULT_CHANNELS {
        return Err(RpcError::new(
            ErrorCode::InvalidParams,
            format!(
                "Unsupported channels {} (expected {})",
                payload.channels_or_default(),
                DEFAULT_CHANNELS
            ),
        ));
    }

    if payload.audio_b64.len() > MAX_AUDIO_B64_BYTES {
        return Err(RpcError::new(
            ErrorCode::PayloadTooLarge,
            format!(
                "audio_b64 exceeds max size ({} > {})",
                payload.audio_b64.len(),
                MAX_AUDIO_B64_BYTES
            ),
        ));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.audio_b64.as_bytes())
        .map_err(|e| {
            RpcError::new(
                ErrorCode::AudioDecodeFailed,
                format!("Invalid base64 audio payload: {e}"),
            )
        })?;

    let samples = match payload.format_or_default().to_ascii_lowercase().as_str() {
        "pcm_s16le" => decode_pcm_s16le(&bytes)?,
        "f32le" => decode_f32le(&bytes)?,
        other => {
            return Err(RpcError::new(
                ErrorCode::UnsupportedAudioFormat,
                format!("Unsupported audio format '{other}'"),
            ))
        }
    };
    Ok(AudioBuffer::new(samples, sample_rate))
}

pub fn encode_f32le_to_base64(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * std::mem::size_of::<f32>());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    encode_bytes_to_base64(&bytes)
}

pub fn encode_bytes_to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn decode_pcm_s16le(bytes: &[u8]) -> Result<Vec<f32>, RpcError> {
    if bytes.len() % 2 != 0 {
        return Err(RpcError::new(
            ErrorCode::AudioDecodeFailed,
            format!(
                "pcm_s16le payload must be divisible by 2 bytes, got {}",
                bytes.len()
            ),
        ));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| {
            let value = i16::from_le_bytes([chunk[0], chunk[1]]);
            (value as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
        })
        .collect())
}

fn decode_f32le(bytes: &[u8]) -> Result<Vec<f32>, RpcError> {
    if bytes.len() % 4 != 0 {
        return Err(RpcError::new(
            ErrorCode::AudioDecodeFailed,
            format!(
                "f32le payload must be divisible by 4 bytes, got {}",
                bytes.len()
            ),
        ));
    }

    let mut samples = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(RpcError::new(
                ErrorCode::AudioDecodeFailed,
                "f32le payload contains non-finite samples",
            ));
        }
        // Out-of-range samples are kept so clipping stays detectable
        samples.push(value);
    }
    Ok(samples)
}
