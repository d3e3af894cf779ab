// SentioVox - Dialogue Scripts
// JSON conversation files: one entry per line with speaker, text and emotions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::emotion::{EmotionLabel, EmotionScores, VoiceStyle};
use crate::pipeline::Segment;
use crate::voice_profile::{ParamAdjustment, ProfileTable};

#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("Dialogue parse error: {0}")]
    Parse(String),
    #[error("Invalid dialogue: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
    /// Classifier scores keyed by emotion name (English or Japanese)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<String>,
}

impl DialogueLine {
    /// Score vector from `emotions`, else one-hot on `dominant_emotion`,
    /// else all zeros (narrated in the normal style)
    pub fn scores(&self) -> EmotionScores {
        if let Some(emotions) = &self.emotions {
            let mut scores = EmotionScores::zeros();
            let mut matched = false;
            for (name, score) in emotions {
                match EmotionLabel::from_name(name) {
                    Some(label) => {
                        scores.set(label, *score);
                        matched = true;
                    }
                    None => log::debug!("[Dialogue] Unknown emotion '{}' ignored", name),
                }
            }
            if matched {
                return scores;
            }
        }

        self.dominant_emotion
            .as_deref()
            .and_then(EmotionLabel::from_name)
            .map(EmotionScores::one_hot)
            .unwrap_or_default()
    }
}

/// Engine voices for each character, optionally per emotion.
///
/// Mapping files written as `{"character_mapping": .., "emotion_mapping": ..}`
/// load into the same fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerMapping {
    /// character -> speaker id
    #[serde(alias = "character_mapping")]
    pub characters: HashMap<String, u32>,
    /// character -> emotion -> speaker id
    #[serde(alias = "emotion_mapping")]
    pub emotions: HashMap<String, HashMap<String, u32>>,
    /// emotion -> parameter tweak
    pub adjustments: HashMap<String, ParamAdjustment>,
}

impl SpeakerMapping {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, DialogueError> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DialogueError::Parse(format!("{}: {}", path.as_ref().display(), e)))?;
        serde_json::from_str(&data).map_err(|e| DialogueError::Parse(e.to_string()))
    }

    /// No voices configured at all
    pub fn is_unmapped(&self) -> bool {
        self.characters.is_empty() && self.emotions.is_empty()
    }

    /// Emotion-specific voice first, then the character's default voice.
    /// An unmapped table reads every character in the normal style.
    pub fn resolve(&self, character: &str, emotion: Option<&str>) -> Option<u32> {
        if self.is_unmapped() {
            return Some(ProfileTable::canonical().get(VoiceStyle::Normal).style_id);
        }
        emotion
            .filter(|e| !e.is_empty())
            .and_then(|e| self.emotions.get(character)?.get(e))
            .or_else(|| self.characters.get(character))
            .copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueScript {
    lines: Vec<DialogueLine>,
}

impl DialogueScript {
    pub fn new(lines: Vec<DialogueLine>) -> Self {
        Self { lines }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, DialogueError> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DialogueError::Parse(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&data)
    }

    /// Parse a JSON array of lines; every line needs `speaker` and `text`
    pub fn from_json_str(data: &str) -> Result<Self, DialogueError> {
        let raw: Value =
            serde_json::from_str(data).map_err(|e| DialogueError::Parse(e.to_string()))?;
        let Value::Array(items) = raw else {
            return Err(DialogueError::Invalid(
                "dialogue must be a JSON array".to_string(),
            ));
        };

        let mut lines = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            for field in ["speaker", "text"] {
                if item.get(field).and_then(Value::as_str).is_none() {
                    return Err(DialogueError::Invalid(format!(
                        "line {index}: missing '{field}'"
                    )));
                }
            }
            let line: DialogueLine = serde_json::from_value(item)
                .map_err(|e| DialogueError::Parse(format!("line {index}: {e}")))?;
            lines.push(line);
        }
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[DialogueLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sorted unique character names and emotion names
    pub fn characters_and_emotions(&self) -> (Vec<String>, Vec<String>) {
        let mut characters = BTreeSet::new();
        let mut emotions = BTreeSet::new();
        for line in &self.lines {
            characters.insert(line.speaker.clone());
            if let Some(dominant) = line.dominant_emotion.as_ref().filter(|e| !e.is_empty()) {
                emotions.insert(dominant.clone());
            }
            if let Some(scores) = &line.emotions {
                emotions.extend(scores.keys().cloned());
            }
        }
        (characters.into_iter().collect(), emotions.into_iter().collect())
    }

    /// Lines `start..=end`, with `end` clamped to the last line
    pub fn slice(&self, start: usize, end: usize) -> &[DialogueLine] {
        if self.lines.is_empty() {
            return &[];
        }
        let end = end.min(self.lines.len() - 1);
        if start > end {
            return &[];
        }
        &self.lines[start..=end]
    }

    /// Orchestrator segments for every line with a resolvable voice
    pub fn to_segments(&self, mapping: &SpeakerMapping) -> Vec<Segment> {
        Self::segments_for(&self.lines, 0, mapping)
    }

    /// Segments for lines `start..=end`; names keep the script's line numbers
    pub fn segments_between(
        &self,
        start: usize,
        end: usize,
        mapping: &SpeakerMapping,
    ) -> Vec<Segment> {
        Self::segments_for(self.slice(start, end), start, mapping)
    }

    /// Build segments named `{line:04}_{speaker}_{emotion}`, where `first_line`
    /// is the script position of `lines[0]`
    pub fn segments_for(
        lines: &[DialogueLine],
        first_line: usize,
        mapping: &SpeakerMapping,
    ) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(lines.len());
        for (offset, line) in lines.iter().enumerate() {
            let emotion = line.dominant_emotion.as_deref();
            let Some(speaker_id) = mapping.resolve(&line.speaker, emotion) else {
                log::warn!(
                    "[Dialogue] No voice mapped for '{}', skipping line",
                    line.speaker
                );
                continue;
            };

            let name = format!(
                "{:04}_{}_{}",
                first_line + offset,
                line.speaker,
                emotion.unwrap_or_default()
            );
            let mut segment = Segment::new(line.text.clone(), line.scores())
                .with_speaker(speaker_id)
                .with_name(name);
            if let Some(adjustment) = emotion.and_then(|e| mapping.adjustments.get(e)) {
                segment = segment.with_adjustment(*adjustment);
            }
            segments.push(segment);
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"[
        {"speaker": "Aoi", "text": "おはよう！", "dominant_emotion": "喜び",
         "emotions": {"喜び": 0.8, "信頼": 0.2}},
        {"speaker": "Ren", "text": "眠い…", "dominant_emotion": "sadness"},
        {"speaker": "Narrator", "text": "朝が来た。"},
        {"speaker": "Ghost", "text": "……"}
    ]"#;

    fn mapping() -> SpeakerMapping {
        SpeakerMapping {
            characters: HashMap::from([
                ("Aoi".to_string(), 10),
                ("Ren".to_string(), 20),
                ("Narrator".to_string(), 30),
            ]),
            emotions: HashMap::from([(
                "Aoi".to_string(),
                HashMap::from([("喜び".to_string(), 11)]),
            )]),
            adjustments: HashMap::from([(
                "sadness".to_string(),
                ParamAdjustment {
                    speed_scale: Some(0.8),
                    ..Default::default()
                },
            )]),
        }
    }

    #[test]
    fn parses_and_validates() {
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        assert_eq!(script.len(), 4);

        let err = DialogueScript::from_json_str(r#"[{"speaker": "A"}]"#).unwrap_err();
        assert!(matches!(err, DialogueError::Invalid(_)));
        let err = DialogueScript::from_json_str(r#"{"speaker": "A", "text": "x"}"#).unwrap_err();
        assert!(matches!(err, DialogueError::Invalid(_)));
        assert!(matches!(
            DialogueScript::from_json_str("[").unwrap_err(),
            DialogueError::Parse(_)
        ));
    }

    #[test]
    fn collects_characters_and_emotions() {
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        let (characters, emotions) = script.characters_and_emotions();
        assert_eq!(characters, vec!["Aoi", "Ghost", "Narrator", "Ren"]);
        assert_eq!(emotions, vec!["sadness", "信頼", "喜び"]);
    }

    #[test]
    fn slice_clamps_end() {
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        assert_eq!(script.slice(1, 99).len(), 3);
        assert_eq!(script.slice(2, 2)[0].speaker, "Narrator");
        assert!(script.slice(5, 9).is_empty());
        assert!(DialogueScript::default().slice(0, 3).is_empty());
    }

    #[test]
    fn resolves_emotion_voice_before_character_voice() {
        let mapping = mapping();
        assert_eq!(mapping.resolve("Aoi", Some("喜び")), Some(11));
        assert_eq!(mapping.resolve("Aoi", Some("怒り")), Some(10));
        assert_eq!(mapping.resolve("Aoi", None), Some(10));
        assert_eq!(mapping.resolve("Ghost", None), None);
    }

    #[test]
    fn builds_segments_with_scores_and_overrides() {
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        let segments = script.to_segments(&mapping());
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].speaker_override, Some(11));
        assert_eq!(segments[0].scores.get(EmotionLabel::Joy), 0.8);
        assert_eq!(segments[0].scores.get(EmotionLabel::Trust), 0.2);

        assert_eq!(segments[1].speaker_override, Some(20));
        assert_eq!(segments[1].scores, EmotionScores::one_hot(EmotionLabel::Sadness));
        assert_eq!(segments[1].adjustment.and_then(|a| a.speed_scale), Some(0.8));

        assert_eq!(segments[2].scores, EmotionScores::zeros());
        assert!(segments[2].adjustment.is_none());

        assert_eq!(segments[0].name.as_deref(), Some("0000_Aoi_喜び"));
        assert_eq!(segments[2].name.as_deref(), Some("0002_Narrator_"));
    }

    #[test]
    fn accepts_character_and_emotion_mapping_keys() {
        let mapping: SpeakerMapping = serde_json::from_str(
            r#"{"character_mapping": {"Aoi": 888753764},
                "emotion_mapping": {"Aoi": {"喜び": 888753762}}}"#,
        )
        .unwrap();
        assert_eq!(mapping.resolve("Aoi", None), Some(888753764));
        assert_eq!(mapping.resolve("Aoi", Some("喜び")), Some(888753762));
        assert_eq!(mapping.resolve("Ren", None), None);

        let mapping: SpeakerMapping =
            serde_json::from_str(r#"{"character_mapping": {"Aoi": 888753764}, "emotion_mapping": {}}"#)
                .unwrap();
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        let segments = script.to_segments(&mapping);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker_override, Some(888753764));
    }

    #[test]
    fn unmapped_table_uses_normal_voice_for_everyone() {
        let mapping = SpeakerMapping::default();
        assert!(mapping.is_unmapped());
        assert_eq!(mapping.resolve("Ghost", Some("喜び")), Some(888753761));

        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        let segments = script.to_segments(&mapping);
        assert_eq!(segments.len(), 4);
        assert!(segments
            .iter()
            .all(|s| s.speaker_override == Some(888753761)));
    }

    #[test]
    fn range_segments_keep_script_line_numbers() {
        let script = DialogueScript::from_json_str(SCRIPT).unwrap();
        let segments = script.segments_between(1, 2, &mapping());
        let names: Vec<_> = segments.iter().filter_map(|s| s.name.as_deref()).collect();
        assert_eq!(names, vec!["0001_Ren_sadness", "0002_Narrator_"]);
    }

    #[test]
    fn loads_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{"character_mapping": {"Ren": 20}}"#).unwrap();
        let mapping = SpeakerMapping::from_json_file(&path).unwrap();
        assert_eq!(mapping.resolve("Ren", Some("sadness")), Some(20));

        assert!(matches!(
            SpeakerMapping::from_json_file(dir.path().join("missing.json")),
            Err(DialogueError::Parse(_))
        ));
    }
}
