// SentioVox - Text-to-Speech Engine Client
// Speaks the VOICEVOX-compatible HTTP API exposed by AivisSpeech:
// POST /audio_query -> adjust query -> POST /synthesis -> WAV bytes

use serde_json::Value;
use std::io::Cursor;
use std::net::IpAddr;
use std::time::Duration;

use crate::audio_processor::AudioBuffer;
use crate::config::EngineConfig;
use crate::voice_profile::VoiceParams;

/// Sentence endings that need no extra punctuation
const SENTENCE_ENDINGS: [char; 4] = ['。', '！', '？', '、'];

/// Synthesis backend used by the orchestrator.
///
/// `params` is `None` when the engine should keep its own defaults.
pub trait SpeechSynthesizer {
    fn synthesize(
        &mut self,
        text: &str,
        style_id: u32,
        params: Option<&VoiceParams>,
    ) -> Result<AudioBuffer, TtsError>;

    fn engine_name(&self) -> &str;
}

/// Blocking client for an AivisSpeech / VOICEVOX engine
pub struct AivisClient {
    client: reqwest::blocking::Client,
    config: EngineConfig,
    output_sample_rate: u32,
}

impl AivisClient {
    pub fn new(config: &EngineConfig, output_sample_rate: u32) -> Result<Self, TtsError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs));
        // A local engine must not be routed through a system proxy
        if is_loopback_url(&config.base_url) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| TtsError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            output_sample_rate,
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url(), endpoint)
    }

    /// True when `GET /version` answers with a success status
    pub fn check_health(&self) -> bool {
        match self.client.get(self.url("version")).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("[TTS] Health check failed: {}", e);
                false
            }
        }
    }

    pub fn version(&self) -> Result<String, TtsError> {
        let response =
            self.send_with_retry("version", || self.client.get(self.url("version")).send())?;
        let value: Value = response
            .json()
            .map_err(|e| TtsError::InvalidResponse(format!("version: {}", e)))?;
        Ok(match value {
            Value::String(version) => version,
            other => other.to_string(),
        })
    }

    /// Raw speaker/style listing from `GET /speakers`
    pub fn speakers(&self) -> Result<Value, TtsError> {
        let response =
            self.send_with_retry("speakers", || self.client.get(self.url("speakers")).send())?;
        response
            .json()
            .map_err(|e| TtsError::InvalidResponse(format!("speakers: {}", e)))
    }

    pub fn audio_query(&self, text: &str, style_id: u32) -> Result<Value, TtsError> {
        let speaker = style_id.to_string();
        let response = self.send_with_retry("audio_query", || {
            self.client
                .post(self.url("audio_query"))
                .query(&[("text", text), ("speaker", speaker.as_str())])
                .send()
        })?;
        let query: Value = response
            .json()
            .map_err(|e| TtsError::InvalidResponse(format!("audio_query: {}", e)))?;
        if !query.is_object() {
            return Err(TtsError::InvalidResponse(
                "audio_query did not return an object".to_string(),
            ));
        }
        Ok(query)
    }

    pub fn synthesis(&self, query: &Value, style_id: u32) -> Result<Vec<u8>, TtsError> {
        let speaker = style_id.to_string();
        let response = self.send_with_retry("synthesis", || {
            self.client
                .post(self.url("synthesis"))
                .query(&[("speaker", speaker.as_str())])
                .header("accept", "audio/wav")
                .json(query)
                .send()
        })?;
        let bytes = response
            .bytes()
            .map_err(|e| TtsError::InvalidResponse(format!("synthesis body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Send a request up to `max_retries` times, pausing `retry_delay_ms`
    /// between attempts. Non-success statuses count as failures.
    fn send_with_retry<F>(
        &self,
        endpoint: &str,
        mut send: F,
    ) -> Result<reqwest::blocking::Response, TtsError>
    where
        F: FnMut() -> reqwest::Result<reqwest::blocking::Response>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = TtsError::Connection(format!("{endpoint}: no attempt made"));

        for attempt in 1..=attempts {
            match send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().unwrap_or_default();
                    last_error = TtsError::Http(format!("{endpoint} {status}: {body}"));
                }
                Err(e) => {
                    last_error = TtsError::Connection(format!("{endpoint}: {e}"));
                }
            }

            if attempt < attempts {
                log::warn!(
                    "[TTS] Request failed, retrying ({}/{}): {}",
                    attempt,
                    attempts,
                    last_error
                );
                std::thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
            }
        }

        log::error!("[TTS] Request failed after {} attempts: {}", attempts, last_error);
        Err(last_error)
    }
}

impl SpeechSynthesizer for AivisClient {
    fn synthesize(
        &mut self,
        text: &str,
        style_id: u32,
        params: Option<&VoiceParams>,
    ) -> Result<AudioBuffer, TtsError> {
        let text = preprocess_text(text, self.config.max_text_length)?;
        let mut query = self.audio_query(&text, style_id)?;
        apply_voice_params(&mut query, params, &self.config, self.output_sample_rate)?;
        let wav = self.synthesis(&query, style_id)?;
        let audio = decode_wav(&wav)?;
        log::debug!(
            "[TTS] Synthesized {} chars -> {:.2}s @ {} Hz (style {})",
            text.chars().count(),
            audio.duration_secs(),
            audio.sample_rate,
            style_id
        );
        Ok(audio)
    }

    fn engine_name(&self) -> &str {
        "aivis"
    }
}

/// True only when the URL's host is `localhost` or a loopback address
fn is_loopback_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Normalize text for the engine: collapse whitespace, cap the length and
/// terminate with `。` unless it already ends in sentence punctuation.
pub fn preprocess_text(text: &str, max_chars: usize) -> Result<String, TtsError> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(TtsError::EmptyText);
    }

    let mut text: String = if max_chars > 0 && collapsed.chars().count() > max_chars {
        log::warn!("[TTS] Text truncated to {} characters", max_chars);
        collapsed.chars().take(max_chars).collect()
    } else {
        collapsed
    };

    if !text.ends_with(SENTENCE_ENDINGS) {
        text.push('。');
    }
    Ok(text)
}

/// Write synthesis settings over an `audio_query` result.
///
/// Mixed parameters replace the query's values. With no mixed set the
/// configured volume and phoneme padding are used, and the rest of the
/// engine's defaults stay as returned.
pub fn apply_voice_params(
    query: &mut Value,
    params: Option<&VoiceParams>,
    config: &EngineConfig,
    output_sample_rate: u32,
) -> Result<(), TtsError> {
    let object = query
        .as_object_mut()
        .ok_or_else(|| TtsError::InvalidResponse("audio query is not an object".to_string()))?;

    match params {
        Some(params) => {
            for (name, value) in params.named() {
                object.insert(name.to_string(), Value::from(value));
            }
        }
        None => {
            object.insert("volumeScale".into(), Value::from(config.volume_scale));
            object.insert(
                "prePhonemeLength".into(),
                Value::from(config.pre_post_phoneme_length),
            );
            object.insert(
                "postPhonemeLength".into(),
                Value::from(config.pre_post_phoneme_length),
            );
        }
    }

    object.insert("modelTruncation".into(), Value::from(config.model_truncation));
    object.insert("noiseScale".into(), Value::from(config.noise_scale));
    object.insert("outputSamplingRate".into(), Value::from(output_sample_rate));
    object.insert("outputStereo".into(), Value::Bool(false));
    Ok(())
}

/// Decode WAV bytes to mono f32, averaging channels
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, TtsError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| TtsError::AudioDecode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| TtsError::AudioDecode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| TtsError::AudioDecode(e.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// TTS errors
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("Engine connection error: {0}")]
    Connection(String),
    #[error("Engine HTTP error: {0}")]
    Http(String),
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    #[error("Audio decode error: {0}")]
    AudioDecode(String),
    #[error("Text is empty after preprocessing")]
    EmptyText,
}

impl TtsError {
    /// Whether trying again later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TtsError::Connection(_) | TtsError::Http(_))
    }
}
