// SentioVox - Emotion labels, score vectors and voice styles
// Index order follows the classifier output: joy, sadness, anticipation,
// surprise, anger, fear, disgust, trust.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of emotion categories produced by the classifier
pub const EMOTION_COUNT: usize = 8;

/// One of the eight basic emotions (Plutchik wheel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anticipation,
    Surprise,
    Anger,
    Fear,
    Disgust,
    Trust,
}

impl EmotionLabel {
    /// All labels in classifier index order
    pub const ALL: [EmotionLabel; EMOTION_COUNT] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anticipation,
        EmotionLabel::Surprise,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
        EmotionLabel::Trust,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anticipation => "anticipation",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Trust => "trust",
        }
    }

    /// Label name as emitted by the Japanese emotion classifier
    pub fn japanese_name(self) -> &'static str {
        match self {
            EmotionLabel::Joy => "喜び",
            EmotionLabel::Sadness => "悲しみ",
            EmotionLabel::Anticipation => "期待",
            EmotionLabel::Surprise => "驚き",
            EmotionLabel::Anger => "怒り",
            EmotionLabel::Fear => "恐れ",
            EmotionLabel::Disgust => "嫌悪",
            EmotionLabel::Trust => "信頼",
        }
    }

    /// Parse an English (case-insensitive) or Japanese label name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|label| {
            label.as_str().eq_ignore_ascii_case(name) || label.japanese_name() == name
        })
    }

    pub fn voice_style(self) -> VoiceStyle {
        match self {
            EmotionLabel::Joy => VoiceStyle::Joy,
            EmotionLabel::Sadness => VoiceStyle::Sadness,
            EmotionLabel::Anticipation => VoiceStyle::Anticipation,
            EmotionLabel::Surprise => VoiceStyle::Surprise,
            EmotionLabel::Anger => VoiceStyle::Anger,
            EmotionLabel::Fear => VoiceStyle::Fear,
            EmotionLabel::Disgust => VoiceStyle::Disgust,
            EmotionLabel::Trust => VoiceStyle::Trust,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-segment classifier output, index-aligned with [`EmotionLabel::ALL`].
///
/// Values are expected in [0, 1] and to sum to roughly 1 (softmax), but the
/// mapper only relies on them being finite.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionScores([f64; EMOTION_COUNT]);

impl EmotionScores {
    pub fn new(scores: [f64; EMOTION_COUNT]) -> Self {
        Self(scores)
    }

    pub fn zeros() -> Self {
        Self([0.0; EMOTION_COUNT])
    }

    /// A vector with full weight on a single emotion
    pub fn one_hot(label: EmotionLabel) -> Self {
        let mut scores = [0.0; EMOTION_COUNT];
        scores[label.index()] = 1.0;
        Self(scores)
    }

    /// Build from a classifier slice; `None` unless exactly eight values are given
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let scores: [f64; EMOTION_COUNT] = values.try_into().ok()?;
        Some(Self(scores))
    }

    pub fn get(&self, label: EmotionLabel) -> f64 {
        self.0[label.index()]
    }

    pub fn set(&mut self, label: EmotionLabel, score: f64) {
        self.0[label.index()] = score;
    }

    pub fn as_array(&self) -> &[f64; EMOTION_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        EmotionLabel::ALL.into_iter().zip(self.0.iter().copied())
    }

    /// Highest-scoring emotion; ties resolve to the lowest label index
    pub fn dominant(&self) -> Option<(EmotionLabel, f64)> {
        let mut best: Option<(EmotionLabel, f64)> = None;
        for (label, score) in self.iter() {
            if !score.is_finite() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((label, score)),
            }
        }
        best
    }
}

impl From<[f64; EMOTION_COUNT]> for EmotionScores {
    fn from(scores: [f64; EMOTION_COUNT]) -> Self {
        Self(scores)
    }
}

/// Voice style: neutral narration plus one style per emotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStyle {
    Normal,
    Joy,
    Sadness,
    Anticipation,
    Surprise,
    Anger,
    Fear,
    Disgust,
    Trust,
}

impl VoiceStyle {
    pub const ALL: [VoiceStyle; 9] = [
        VoiceStyle::Normal,
        VoiceStyle::Joy,
        VoiceStyle::Sadness,
        VoiceStyle::Anticipation,
        VoiceStyle::Surprise,
        VoiceStyle::Anger,
        VoiceStyle::Fear,
        VoiceStyle::Disgust,
        VoiceStyle::Trust,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoiceStyle::Normal => "normal",
            VoiceStyle::Joy => "joy",
            VoiceStyle::Sadness => "sadness",
            VoiceStyle::Anticipation => "anticipation",
            VoiceStyle::Surprise => "surprise",
            VoiceStyle::Anger => "anger",
            VoiceStyle::Fear => "fear",
            VoiceStyle::Disgust => "disgust",
            VoiceStyle::Trust => "trust",
        }
    }

    /// The emotion this style expresses (`None` for Normal)
    pub fn emotion(self) -> Option<EmotionLabel> {
        match self {
            VoiceStyle::Normal => None,
            VoiceStyle::Joy => Some(EmotionLabel::Joy),
            VoiceStyle::Sadness => Some(EmotionLabel::Sadness),
            VoiceStyle::Anticipation => Some(EmotionLabel::Anticipation),
            VoiceStyle::Surprise => Some(EmotionLabel::Surprise),
            VoiceStyle::Anger => Some(EmotionLabel::Anger),
            VoiceStyle::Fear => Some(EmotionLabel::Fear),
            VoiceStyle::Disgust => Some(EmotionLabel::Disgust),
            VoiceStyle::Trust => Some(EmotionLabel::Trust),
        }
    }
}

impl fmt::Display for VoiceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("normal") || value == "通常" {
            return Ok(VoiceStyle::Normal);
        }
        EmotionLabel::from_name(value)
            .map(EmotionLabel::voice_style)
            .ok_or_else(|| format!("Unknown voice style '{value}'"))
    }
}
