// SentioVox - Emotion to Voice Parameter Mapping
// Blends per-style baseline profiles by normalized classifier scores

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::SynthesisConfig;
use crate::emotion::{EmotionScores, VoiceStyle};
use crate::voice_profile::{ProfileTable, VoiceParams};

/// Detected styles and their raw weights, iterated in VoiceStyle order
pub type StyleWeights = BTreeMap<VoiceStyle, f64>;

/// Parameter set for one synthesis call
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixedParameters {
    /// Dominant style (highest weight)
    pub style: VoiceStyle,
    /// Engine id of the dominant style; ids are categorical and never blended
    pub style_id: u32,
    /// `None` asks the engine to use its own defaults
    pub params: Option<VoiceParams>,
}

#[derive(Debug, Clone)]
pub struct EmotionVoiceMapper {
    profiles: ProfileTable,
    threshold: f64,
}

impl Default for EmotionVoiceMapper {
    fn default() -> Self {
        Self::new(SynthesisConfig::default().emotion_score_threshold)
    }
}

impl EmotionVoiceMapper {
    pub fn new(threshold: f64) -> Self {
        Self::with_profiles(ProfileTable::canonical(), threshold)
    }

    pub fn with_profiles(profiles: ProfileTable, threshold: f64) -> Self {
        Self {
            profiles,
            threshold,
        }
    }

    /// Build from config, loading profile overrides when a path is set.
    /// An unreadable override file falls back to the canonical table.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let profiles = match &config.profiles_path {
            Some(path) => ProfileTable::from_json_file(path).unwrap_or_else(|e| {
                log::warn!(
                    "[Mapper] Could not load profiles from {}: {}, using canonical table",
                    path.display(),
                    e
                );
                ProfileTable::canonical()
            }),
            None => ProfileTable::canonical(),
        };
        Self::with_profiles(profiles, config.emotion_score_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Keep every emotion whose score clears the threshold.
    /// Never empty: falls back to `{Normal: 1.0}`.
    pub fn convert_scores_to_style_map(&self, scores: &EmotionScores) -> StyleWeights {
        let mut styles: StyleWeights = scores
            .iter()
            .filter(|(_, score)| *score >= self.threshold)
            .map(|(label, score)| (label.voice_style(), score))
            .collect();

        if styles.is_empty() {
            log::debug!("[Mapper] No emotion above {:.3}, using normal", self.threshold);
            styles.insert(VoiceStyle::Normal, 1.0);
        }
        styles
    }

    /// Weight-normalized blend of the contributing profiles.
    ///
    /// Non-finite or non-positive weights do not contribute. If nothing
    /// remains, returns the Normal id with no parameters. Ties for the
    /// dominant style go to the lowest style index.
    pub fn calculate_mixed_parameters(&self, styles: &StyleWeights) -> MixedParameters {
        let contributing: Vec<(VoiceStyle, f64)> = styles
            .iter()
            .map(|(style, weight)| (*style, *weight))
            .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
            .collect();

        let total: f64 = contributing.iter().map(|(_, w)| w).sum();
        if contributing.is_empty() || !total.is_finite() || total <= 0.0 {
            return MixedParameters {
                style: VoiceStyle::Normal,
                style_id: self.profiles.get(VoiceStyle::Normal).style_id,
                params: None,
            };
        }

        let mut dominant = contributing[0];
        for &(style, weight) in &contributing[1..] {
            if weight > dominant.1 {
                dominant = (style, weight);
            }
        }

        let mixed = contributing
            .iter()
            .fold(VoiceParams::zeros(), |acc, (style, weight)| {
                acc.add(&self.profiles.get(*style).params.scaled(weight / total))
            });

        MixedParameters {
            style: dominant.0,
            style_id: self.profiles.get(dominant.0).style_id,
            params: Some(mixed),
        }
    }

    /// Scores straight to a parameter set
    pub fn map_scores(&self, scores: &EmotionScores) -> MixedParameters {
        let styles = self.convert_scores_to_style_map(scores);
        let mixed = self.calculate_mixed_parameters(&styles);
        log::debug!(
            "[Mapper] {} styles -> dominant {} (id {})",
            styles.len(),
            mixed.style,
            mixed.style_id
        );
        mixed
    }
}
