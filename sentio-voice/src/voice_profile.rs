// SentioVox - Voice Parameter Profiles
// Baseline synthesis parameters for each voice style

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::emotion::VoiceStyle;

/// The seven continuous synthesis parameters accepted by the TTS engine.
///
/// Serialized with the engine's camelCase keys so a value can be written
/// straight over an `audio_query` response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParams {
    pub intonation_scale: f64,
    pub tempo_dynamics_scale: f64,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub volume_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
}

impl VoiceParams {
    /// Engine key names, in the same order as [`VoiceParams::to_array`]
    pub const NAMES: [&'static str; 7] = [
        "intonationScale",
        "tempoDynamicsScale",
        "speedScale",
        "pitchScale",
        "volumeScale",
        "prePhonemeLength",
        "postPhonemeLength",
    ];

    pub const fn new(
        intonation_scale: f64,
        tempo_dynamics_scale: f64,
        speed_scale: f64,
        pitch_scale: f64,
        volume_scale: f64,
        pre_phoneme_length: f64,
        post_phoneme_length: f64,
    ) -> Self {
        Self {
            intonation_scale,
            tempo_dynamics_scale,
            speed_scale,
            pitch_scale,
            volume_scale,
            pre_phoneme_length,
            post_phoneme_length,
        }
    }

    pub const fn zeros() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn to_array(&self) -> [f64; 7] {
        [
            self.intonation_scale,
            self.tempo_dynamics_scale,
            self.speed_scale,
            self.pitch_scale,
            self.volume_scale,
            self.pre_phoneme_length,
            self.post_phoneme_length,
        ]
    }

    pub fn from_array(values: [f64; 7]) -> Self {
        Self::new(
            values[0], values[1], values[2], values[3], values[4], values[5], values[6],
        )
    }

    /// Every parameter multiplied by `weight`
    pub fn scaled(&self, weight: f64) -> Self {
        Self::from_array(self.to_array().map(|v| v * weight))
    }

    /// Component-wise sum
    pub fn add(&self, other: &VoiceParams) -> Self {
        let a = self.to_array();
        let b = other.to_array();
        Self::from_array(std::array::from_fn(|i| a[i] + b[i]))
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// (engine key, value) pairs
    pub fn named(&self) -> [(&'static str, f64); 7] {
        let values = self.to_array();
        std::array::from_fn(|i| (Self::NAMES[i], values[i]))
    }
}

/// Per-line tweak applied on top of a mixed parameter set.
///
/// Speed, intonation and volume multiply; pitch adds. Results are clamped
/// to ranges the engine handles well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamAdjustment {
    pub speed_scale: Option<f64>,
    pub pitch_scale: Option<f64>,
    pub intonation_scale: Option<f64>,
    pub volume_scale: Option<f64>,
}

impl ParamAdjustment {
    pub fn apply(&self, params: VoiceParams) -> VoiceParams {
        let mut out = params;
        if let Some(factor) = self.speed_scale {
            out.speed_scale = (out.speed_scale * factor).clamp(0.5, 2.0);
        }
        if let Some(offset) = self.pitch_scale {
            out.pitch_scale = (out.pitch_scale + offset).clamp(-0.15, 0.15);
        }
        if let Some(factor) = self.intonation_scale {
            out.intonation_scale = (out.intonation_scale * factor).clamp(0.0, 2.0);
        }
        if let Some(factor) = self.volume_scale {
            out.volume_scale = (out.volume_scale * factor).clamp(0.0, 2.0);
        }
        out
    }
}

/// Baseline profile for one voice style
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceProfile {
    pub style: VoiceStyle,
    /// Opaque engine speaker/style identifier
    pub style_id: u32,
    pub params: VoiceParams,
}

/// Canonical profile values (style ids are AivisSpeech style identifiers)
const CANONICAL_PROFILES: [VoiceProfile; 9] = [
    VoiceProfile {
        style: VoiceStyle::Normal,
        style_id: 888753761,
        params: VoiceParams::new(1.0, 1.0, 1.0, 0.0, 1.0, 0.1, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Joy,
        style_id: 888753764,
        params: VoiceParams::new(1.2, 1.15, 1.1, 0.03, 1.1, 0.1, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Sadness,
        style_id: 888753765,
        params: VoiceParams::new(0.7, 0.85, 0.9, -0.02, 0.9, 0.2, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Anticipation,
        style_id: 888753762,
        params: VoiceParams::new(1.05, 1.1, 1.05, 0.02, 1.05, 0.1, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Surprise,
        style_id: 888753762,
        params: VoiceParams::new(1.3, 1.2, 1.15, 0.05, 1.2, 0.1, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Anger,
        style_id: 888753765,
        params: VoiceParams::new(1.3, 1.2, 1.05, 0.04, 1.3, 0.1, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Fear,
        style_id: 888753763,
        params: VoiceParams::new(1.1, 1.1, 1.1, 0.03, 0.9, 0.2, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Disgust,
        style_id: 888753765,
        params: VoiceParams::new(1.15, 1.05, 0.95, 0.02, 1.1, 0.2, 0.1),
    },
    VoiceProfile {
        style: VoiceStyle::Trust,
        style_id: 888753763,
        params: VoiceParams::new(1.02, 1.0, 0.95, 0.01, 1.0, 0.1, 0.1),
    },
];

/// JSON override entry. Missing fields keep the canonical value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileOverride {
    style_id: Option<u32>,
    intonation_scale: Option<f64>,
    tempo_dynamics_scale: Option<f64>,
    speed_scale: Option<f64>,
    pitch_scale: Option<f64>,
    volume_scale: Option<f64>,
    pre_phoneme_length: Option<f64>,
    post_phoneme_length: Option<f64>,
}

/// Immutable lookup table VoiceStyle -> VoiceProfile
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    profiles: [VoiceProfile; 9],
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ProfileTable {
    pub fn canonical() -> Self {
        Self {
            profiles: CANONICAL_PROFILES,
        }
    }

    pub fn get(&self, style: VoiceStyle) -> &VoiceProfile {
        &self.profiles[style.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceProfile> {
        self.profiles.iter()
    }

    /// Load the canonical table with per-style overrides from a JSON file.
    ///
    /// Format: `{"joy": {"style_id": 1, "speed_scale": 1.2}, "normal": {...}}`.
    /// Keys accept English or Japanese style names.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let table = Self::from_json_str(&content)?;
        log::info!(
            "[Profiles] Loaded voice profile overrides from {}",
            path.as_ref().display()
        );
        Ok(table)
    }

    pub fn from_json_str(content: &str) -> Result<Self, std::io::Error> {
        let overrides: HashMap<String, ProfileOverride> = serde_json::from_str(content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut table = Self::canonical();
        for (name, entry) in overrides {
            let style: VoiceStyle = name
                .parse()
                .map_err(|e: String| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let profile = &mut table.profiles[style.index()];
            apply_override(profile, &entry);
            if !profile.params.is_finite() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Non-finite parameter in profile '{}'", style),
                ));
            }
        }
        Ok(table)
    }
}

fn apply_override(profile: &mut VoiceProfile, entry: &ProfileOverride) {
    if let Some(id) = entry.style_id {
        profile.style_id = id;
    }
    let p = &mut profile.params;
    let fields = [
        (&mut p.intonation_scale, entry.intonation_scale),
        (&mut p.tempo_dynamics_scale, entry.tempo_dynamics_scale),
        (&mut p.speed_scale, entry.speed_scale),
        (&mut p.pitch_scale, entry.pitch_scale),
        (&mut p.volume_scale, entry.volume_scale),
        (&mut p.pre_phoneme_length, entry.pre_phoneme_length),
        (&mut p.post_phoneme_length, entry.post_phoneme_length),
    ];
    for (dst, value) in fields {
        if let Some(value) = value {
            *dst = value;
        }
    }
}
