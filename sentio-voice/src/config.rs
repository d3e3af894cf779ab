// SentioVox - Synthesis Configuration
// Every tunable constant of the mapping, audio and engine layers

use dirs::data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_PATH: &str = "sentio-voice/config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(String),
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Signal-processing thresholds used by the audio processor and quality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Amplitude at or below which a sample counts as silence
    pub silence_threshold: f32,
    /// Samples kept around detected speech when trimming
    pub margin_samples: usize,
    /// Trims that would leave less than this are abandoned
    pub min_segment_length_secs: f32,
    pub target_db: f32,
    pub fade_samples: usize,
    /// Zero samples inserted between consecutive segments
    pub silence_duration: usize,
    pub max_segment_length_secs: f32,
    pub min_split_segment_secs: f32,
    /// Width of the natural-split search window (samples)
    pub split_window_size: usize,
    /// Moving-average window for the split envelope (samples)
    pub split_smoothing_window: usize,
    /// Distance kept between a split point and the buffer edges
    pub split_margin_secs: f32,
    pub max_amplitude_threshold: f32,
    /// RMS floor below which audio is reported as too quiet
    pub min_audio_quality: f32,
    pub max_dc_offset: f32,
    pub clipping_threshold: f32,
    pub min_gain: f32,
    pub max_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.01,
            margin_samples: 100,
            min_segment_length_secs: 0.1,
            target_db: -20.0,
            fade_samples: 100,
            silence_duration: 800,
            max_segment_length_secs: 15.0,
            min_split_segment_secs: 0.5,
            split_window_size: 4800,
            split_smoothing_window: 100,
            split_margin_secs: 0.1,
            max_amplitude_threshold: 0.8,
            min_audio_quality: 0.01,
            max_dc_offset: 0.1,
            clipping_threshold: 0.99,
            min_gain: 0.1,
            max_gain: 10.0,
        }
    }
}

/// Toggles for the post-synthesis preprocessing chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingOptions {
    pub normalize: bool,
    pub remove_dc: bool,
    pub apply_fade: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            remove_dc: true,
            apply_fade: true,
        }
    }
}

/// Connection and request settings for the HTTP speech engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_text_length: usize,
    /// Used when the mixed parameter set is empty
    pub volume_scale: f64,
    pub model_truncation: f64,
    pub noise_scale: f64,
    /// Used when the mixed parameter set is empty
    pub pre_post_phoneme_length: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:10101".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 30,
            max_text_length: 1000,
            volume_scale: 1.2,
            model_truncation: 0.8,
            noise_scale: 0.4,
            pre_post_phoneme_length: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Minimum classifier score for an emotion to count as detected
    pub emotion_score_threshold: f64,
    pub output_sample_rate: u32,
    pub audio: AudioConfig,
    pub preprocessing: PreprocessingOptions,
    pub engine: EngineConfig,
    /// Optional per-style profile overrides (see `ProfileTable::from_json_file`)
    pub profiles_path: Option<PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            emotion_score_threshold: 0.01,
            output_sample_rate: 24000,
            audio: AudioConfig::default(),
            preprocessing: PreprocessingOptions::default(),
            engine: EngineConfig::default(),
            profiles_path: None,
        }
    }
}

impl SynthesisConfig {
    /// Load from the user data directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("[Config] Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigError::Io("Could not find config path".to_string()))?;
        self.save_to(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let data =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn config_path() -> Option<PathBuf> {
        data_dir().map(|p| p.join(CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.audio;

        let non_negative: [(&str, f64); 11] = [
            ("emotion_score_threshold", self.emotion_score_threshold),
            ("silence_threshold", a.silence_threshold as f64),
            ("min_segment_length_secs", a.min_segment_length_secs as f64),
            ("max_segment_length_secs", a.max_segment_length_secs as f64),
            ("min_split_segment_secs", a.min_split_segment_secs as f64),
            ("split_margin_secs", a.split_margin_secs as f64),
            ("max_amplitude_threshold", a.max_amplitude_threshold as f64),
            ("min_audio_quality", a.min_audio_quality as f64),
            ("max_dc_offset", a.max_dc_offset as f64),
            ("clipping_threshold", a.clipping_threshold as f64),
            ("min_gain", a.min_gain as f64),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number (got {value})"
                )));
            }
        }

        if !a.target_db.is_finite() {
            return Err(ConfigError::Invalid("target_db must be finite".to_string()));
        }
        if !a.max_gain.is_finite() || a.min_gain > a.max_gain {
            return Err(ConfigError::Invalid(format!(
                "gain range inverted: min_gain {} > max_gain {}",
                a.min_gain, a.max_gain
            )));
        }
        if a.min_split_segment_secs > a.max_segment_length_secs {
            return Err(ConfigError::Invalid(format!(
                "min_split_segment_secs {} exceeds max_segment_length_secs {}",
                a.min_split_segment_secs, a.max_segment_length_secs
            )));
        }
        if a.split_smoothing_window == 0 {
            return Err(ConfigError::Invalid(
                "split_smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.output_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "output_sample_rate must be positive".to_string(),
            ));
        }

        let e = &self.engine;
        if e.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.base_url is empty".to_string()));
        }
        for (name, value) in [
            ("engine.volume_scale", e.volume_scale),
            ("engine.model_truncation", e.model_truncation),
            ("engine.noise_scale", e.noise_scale),
            ("engine.pre_post_phoneme_length", e.pre_post_phoneme_length),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }
}
