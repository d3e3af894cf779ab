//! Sentio Voice - Emotion-expressive speech synthesis
//!
//! Maps per-segment emotion scores onto speech-engine parameters by weighted
//! profile mixing, drives an AivisSpeech/VOICEVOX-compatible engine segment by
//! segment, and cleans up and stitches the returned audio (silence trimming,
//! DC removal, loudness normalization, fades, natural splitting).
//!
//! The emotion classifier and the speech engine are external collaborators;
//! this crate only consumes their outputs through plain types and the
//! `SpeechSynthesizer` trait.

// Core modules
pub mod audio_processor;
pub mod audio_quality;
pub mod config;
pub mod dialogue;
pub mod emotion;
pub mod emotion_mapper;
pub mod output;
pub mod pipeline;
pub mod tts;
pub mod voice_profile;

// Re-export main types for convenience
pub use audio_processor::{AudioBuffer, AudioProcessor, FadeType};
pub use audio_quality::{check_audio_quality, AudioQualityGate, QualityIssue, QualityReport};
pub use config::{AudioConfig, ConfigError, EngineConfig, PreprocessingOptions, SynthesisConfig};
pub use dialogue::{DialogueError, DialogueLine, DialogueScript, SpeakerMapping};
pub use emotion::{EmotionLabel, EmotionScores, VoiceStyle, EMOTION_COUNT};
pub use emotion_mapper::{EmotionVoiceMapper, MixedParameters, StyleWeights};
pub use output::{save_segment_files, AudioSink, OutputError, WavBytesSink, WavFileSink};
pub use pipeline::{
    PipelineError, Segment, SegmentAudio, StopHandle, SynthesisEvent, SynthesisEventSink,
    SynthesisOrchestrator, SynthesisOutput, SynthesisState,
};
pub use tts::{AivisClient, SpeechSynthesizer, TtsError};
pub use voice_profile::{ParamAdjustment, ProfileTable, VoiceParams, VoiceProfile};
