// SentioVox - Audio Quality Gate
// Diagnostic checks on synthesized audio: level, clipping and DC offset

use serde::Serialize;

use crate::config::AudioConfig;

/// A single quality concern found in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    /// RMS below the quality floor; a warning only
    TooQuiet,
    /// Peak amplitude above the clipping threshold
    Clipping,
    /// Mean offset above the allowed maximum
    DcOffset,
}

impl QualityIssue {
    /// Whether callers gating on quality should reject the buffer
    pub fn is_blocking(self) -> bool {
        matches!(self, QualityIssue::Clipping | QualityIssue::DcOffset)
    }
}

/// Measured levels plus every issue found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub rms: f32,
    pub peak: f32,
    pub dc_offset: f32,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    /// False only for clipping or excessive DC offset
    pub fn is_acceptable(&self) -> bool {
        !self.issues.iter().any(|issue| issue.is_blocking())
    }
}

/// Stateless quality gate over whole buffers
#[derive(Debug, Clone, Copy)]
pub struct AudioQualityGate {
    min_rms: f32,
    clipping_threshold: f32,
    max_dc_offset: f32,
}

impl Default for AudioQualityGate {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

impl AudioQualityGate {
    pub fn new(min_rms: f32, clipping_threshold: f32, max_dc_offset: f32) -> Self {
        Self {
            min_rms,
            clipping_threshold,
            max_dc_offset,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(
            config.min_audio_quality,
            config.clipping_threshold,
            config.max_dc_offset,
        )
    }

    /// Calculate RMS energy of audio samples
    pub fn calculate_rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Calculate peak amplitude
    pub fn calculate_peak(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Arithmetic mean of the samples
    pub fn calculate_dc_offset(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    /// Measure a buffer without logging
    pub fn inspect(&self, samples: &[f32]) -> QualityReport {
        let rms = Self::calculate_rms(samples);
        let peak = Self::calculate_peak(samples);
        let dc_offset = Self::calculate_dc_offset(samples);

        let mut issues = Vec::new();
        if rms < self.min_rms {
            issues.push(QualityIssue::TooQuiet);
        }
        if peak > self.clipping_threshold {
            issues.push(QualityIssue::Clipping);
        }
        if dc_offset.abs() > self.max_dc_offset {
            issues.push(QualityIssue::DcOffset);
        }

        QualityReport {
            rms,
            peak,
            dc_offset,
            issues,
        }
    }

    /// Log every issue found; false only for clipping or DC offset
    pub fn check(&self, samples: &[f32]) -> bool {
        let report = self.inspect(samples);
        for issue in &report.issues {
            match issue {
                QualityIssue::TooQuiet => {
                    log::warn!("[Audio] Low audio level: RMS {:.4}", report.rms)
                }
                QualityIssue::Clipping => {
                    log::warn!("[Audio] Clipping detected: peak {:.4}", report.peak)
                }
                QualityIssue::DcOffset => {
                    log::warn!("[Audio] DC offset detected: {:.4}", report.dc_offset)
                }
            }
        }
        report.is_acceptable()
    }
}

/// Quality check with default thresholds
pub fn check_audio_quality(samples: &[f32]) -> bool {
    AudioQualityGate::default().check(samples)
}
