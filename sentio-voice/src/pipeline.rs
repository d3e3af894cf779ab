//! Synthesis Pipeline - emotion-aware multi-segment speech synthesis
//!
//! Runs each (text, emotion scores) segment through the mapper and the
//! speech engine, cleans up the returned audio and stitches the results
//! into one waveform. Consumers implement SynthesisEventSink to follow
//! progress.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::audio_processor::{resample, AudioBuffer, AudioProcessor};
use crate::audio_quality::{AudioQualityGate, QualityIssue};
use crate::config::{PreprocessingOptions, SynthesisConfig};
use crate::emotion::{EmotionScores, VoiceStyle};
use crate::emotion_mapper::EmotionVoiceMapper;
use crate::output::AudioSink;
use crate::tts::SpeechSynthesizer;
use crate::voice_profile::ParamAdjustment;

/// One unit of input text with its classifier scores
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub scores: EmotionScores,
    /// Replaces the dominant style id (dialogue speakers)
    pub speaker_override: Option<u32>,
    /// Applied to the mixed parameters when present
    pub adjustment: Option<ParamAdjustment>,
    /// File stem used when segments are exported one by one
    pub name: Option<String>,
}

impl Segment {
    pub fn new(text: impl Into<String>, scores: EmotionScores) -> Self {
        Self {
            text: text.into(),
            scores,
            speaker_override: None,
            adjustment: None,
            name: None,
        }
    }

    pub fn with_speaker(mut self, speaker_id: u32) -> Self {
        self.speaker_override = Some(speaker_id);
        self
    }

    pub fn with_adjustment(mut self, adjustment: ParamAdjustment) -> Self {
        self.adjustment = Some(adjustment);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Events emitted by the synthesis pipeline
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Pipeline state changed
    StateChanged { state: SynthesisState },
    /// Blank segment, nothing sent to the engine
    SegmentSkipped { index: usize },
    /// Segment audio ready and preprocessed
    SegmentSynthesized {
        index: usize,
        style: VoiceStyle,
        style_id: u32,
        duration_secs: f32,
        sample_rate: u32,
    },
    /// Engine call failed; the run continues
    SegmentFailed {
        index: usize,
        message: String,
        retryable: bool,
    },
    /// Non-fatal quality concerns on a synthesized segment
    QualityWarning {
        index: usize,
        issues: Vec<QualityIssue>,
    },
    /// Final waveform assembled
    Completed {
        duration_secs: f32,
        synthesized: usize,
        failed: usize,
    },
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    Synthesizing { index: usize },
    Combining,
    Output,
    Done,
    Failed,
}

/// Trait for receiving synthesis pipeline events
pub trait SynthesisEventSink: Send + Sync {
    fn on_event(&self, event: SynthesisEvent);
}

/// No-op event sink (silent operation)
pub struct NoopEventSink;
impl SynthesisEventSink for NoopEventSink {
    fn on_event(&self, _event: SynthesisEvent) {}
}

/// Logging event sink
pub struct LogEventSink;
impl SynthesisEventSink for LogEventSink {
    fn on_event(&self, event: SynthesisEvent) {
        match &event {
            SynthesisEvent::StateChanged { state } => log::debug!("[Pipeline] State: {:?}", state),
            SynthesisEvent::SegmentSkipped { index } => {
                log::info!("[Pipeline] Segment {}: empty text, skipped", index)
            }
            SynthesisEvent::SegmentSynthesized {
                index,
                style,
                style_id,
                duration_secs,
                sample_rate,
            } => {
                log::info!(
                    "[Pipeline] Segment {}: {} (id {}) {:.2}s @ {} Hz",
                    index,
                    style,
                    style_id,
                    duration_secs,
                    sample_rate
                );
            }
            SynthesisEvent::SegmentFailed { index, message, .. } => {
                log::debug!("[Pipeline] Segment {} failed: {}", index, message)
            }
            SynthesisEvent::QualityWarning { index, issues } => {
                log::warn!("[Pipeline] Segment {} quality: {:?}", index, issues)
            }
            SynthesisEvent::Completed {
                duration_secs,
                synthesized,
                failed,
            } => log::info!(
                "[Pipeline] Done: {:.2}s from {} segments ({} failed)",
                duration_secs,
                synthesized,
                failed
            ),
        }
    }
}

/// Lets another thread stop a run between segments.
/// A segment already handed to the engine still completes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Preprocessed audio of one synthesized segment
#[derive(Debug, Clone)]
pub struct SegmentAudio {
    /// Position in the input segment list
    pub index: usize,
    pub name: Option<String>,
    pub audio: AudioBuffer,
}

/// Result of a run with at least one synthesized segment
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub audio: AudioBuffer,
    /// Per-segment audio in input order, before silence is inserted
    pub segments: Vec<SegmentAudio>,
    pub segments_synthesized: usize,
    pub segments_failed: usize,
    pub segments_skipped: usize,
    /// Stopped before every segment was attempted
    pub stopped: bool,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No segments with text to synthesize")]
    NoSegments,
    #[error("All {attempted} segments failed to synthesize")]
    AllSegmentsFailed { attempted: usize },
    #[error("Synthesis stopped before any segment completed")]
    Stopped,
    #[error("Output failed: {0}")]
    Output(String),
}

/// Sequential synthesis over an injected speech engine
pub struct SynthesisOrchestrator<S: SpeechSynthesizer> {
    synthesizer: S,
    mapper: EmotionVoiceMapper,
    processor: AudioProcessor,
    quality_gate: AudioQualityGate,
    preprocessing: PreprocessingOptions,
    state: Arc<Mutex<SynthesisState>>,
    event_sink: Arc<dyn SynthesisEventSink>,
    stop: StopHandle,
}

impl<S: SpeechSynthesizer> SynthesisOrchestrator<S> {
    pub fn new(
        synthesizer: S,
        config: &SynthesisConfig,
        event_sink: Arc<dyn SynthesisEventSink>,
    ) -> Self {
        Self::with_mapper(
            synthesizer,
            EmotionVoiceMapper::from_config(config),
            config,
            event_sink,
        )
    }

    pub fn with_mapper(
        synthesizer: S,
        mapper: EmotionVoiceMapper,
        config: &SynthesisConfig,
        event_sink: Arc<dyn SynthesisEventSink>,
    ) -> Self {
        Self {
            synthesizer,
            mapper,
            processor: AudioProcessor::new(config.audio.clone()),
            quality_gate: AudioQualityGate::from_config(&config.audio),
            preprocessing: config.preprocessing,
            state: Arc::new(Mutex::new(SynthesisState::Idle)),
            event_sink,
            stop: StopHandle::default(),
        }
    }

    /// Get current pipeline state
    pub fn state(&self) -> SynthesisState {
        *self.state.lock()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn synthesizer(&self) -> &S {
        &self.synthesizer
    }

    pub fn mapper(&self) -> &EmotionVoiceMapper {
        &self.mapper
    }

    fn set_state(&self, state: SynthesisState) {
        *self.state.lock() = state;
        self.event_sink.on_event(SynthesisEvent::StateChanged { state });
    }

    /// Synthesize every segment in order and combine the results.
    ///
    /// Individual failures are logged and skipped. Only a run with no
    /// successful segment returns an error.
    pub fn run(&mut self, segments: &[Segment]) -> Result<SynthesisOutput, PipelineError> {
        let mut collected: Vec<AudioBuffer> = Vec::new();
        let mut produced: Vec<(usize, Option<String>)> = Vec::new();
        let mut sample_rate: Option<u32> = None;
        let mut attempted = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut stopped = false;

        log::info!("[Pipeline] Synthesizing {} segments", segments.len());

        for (index, segment) in segments.iter().enumerate() {
            if self.stop.is_stopped() {
                log::info!("[Pipeline] Stop requested before segment {}", index);
                stopped = true;
                break;
            }
            self.set_state(SynthesisState::Synthesizing { index });

            if segment.text.trim().is_empty() {
                skipped += 1;
                self.event_sink.on_event(SynthesisEvent::SegmentSkipped { index });
                continue;
            }
            attempted += 1;

            let mixed = self.mapper.map_scores(&segment.scores);
            let style_id = segment.speaker_override.unwrap_or(mixed.style_id);
            let params = match (mixed.params, &segment.adjustment) {
                (Some(params), Some(adjustment)) => Some(adjustment.apply(params)),
                (params, _) => params,
            };

            let audio = match self
                .synthesizer
                .synthesize(&segment.text, style_id, params.as_ref())
            {
                Ok(audio) if audio.is_empty() || audio.sample_rate == 0 => {
                    failed += 1;
                    self.event_sink.on_event(SynthesisEvent::SegmentFailed {
                        index,
                        message: "engine returned no audio".to_string(),
                        retryable: false,
                    });
                    continue;
                }
                Ok(audio) => audio,
                Err(e) => {
                    log::warn!("[Pipeline] Segment {} synthesis failed: {}", index, e);
                    failed += 1;
                    self.event_sink.on_event(SynthesisEvent::SegmentFailed {
                        index,
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                    continue;
                }
            };

            let audio = self.processor.apply_preprocessing(audio, &self.preprocessing);

            let report = self.quality_gate.inspect(&audio.samples);
            if !report.issues.is_empty() {
                self.event_sink.on_event(SynthesisEvent::QualityWarning {
                    index,
                    issues: report.issues.clone(),
                });
            }

            let rate = *sample_rate.get_or_insert(audio.sample_rate);
            let audio = if audio.sample_rate != rate {
                log::warn!(
                    "[Pipeline] Segment {} at {} Hz, resampling to {} Hz",
                    index,
                    audio.sample_rate,
                    rate
                );
                resample(audio, rate)
            } else {
                audio
            };

            self.event_sink.on_event(SynthesisEvent::SegmentSynthesized {
                index,
                style: mixed.style,
                style_id,
                duration_secs: audio.duration_secs(),
                sample_rate: audio.sample_rate,
            });
            collected.push(audio);
            produced.push((index, segment.name.clone()));
        }

        let Some(rate) = sample_rate.filter(|_| !collected.is_empty()) else {
            self.set_state(SynthesisState::Failed);
            return Err(if stopped {
                PipelineError::Stopped
            } else if attempted == 0 {
                PipelineError::NoSegments
            } else {
                log::error!("[Pipeline] All {} segments failed", attempted);
                PipelineError::AllSegmentsFailed { attempted }
            });
        };

        self.set_state(SynthesisState::Combining);
        let audio = self.processor.combine_segments_with_silence(&collected, rate);
        let synthesized = collected.len();

        self.event_sink.on_event(SynthesisEvent::Completed {
            duration_secs: audio.duration_secs(),
            synthesized,
            failed,
        });
        self.set_state(SynthesisState::Done);

        let segments = produced
            .into_iter()
            .zip(collected)
            .map(|((index, name), audio)| SegmentAudio { index, name, audio })
            .collect();

        Ok(SynthesisOutput {
            audio,
            segments,
            segments_synthesized: synthesized,
            segments_failed: failed,
            segments_skipped: skipped,
            stopped,
        })
    }

    /// Run and hand the final waveform to `sink`
    pub fn run_to_sink(
        &mut self,
        segments: &[Segment],
        sink: &mut dyn AudioSink,
    ) -> Result<SynthesisOutput, PipelineError> {
        let output = self.run(segments)?;
        self.set_state(SynthesisState::Output);
        if let Err(e) = sink.write(&output.audio) {
            self.set_state(SynthesisState::Failed);
            return Err(PipelineError::Output(e.to_string()));
        }
        self.set_state(SynthesisState::Done);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionLabel;
    use crate::tts::TtsError;
    use crate::voice_profile::VoiceParams;

    /// Records every call and answers with a fixed-length tone
    struct RecordingSynth {
        calls: Vec<(String, u32, Option<VoiceParams>)>,
        fail_on: Vec<usize>,
        sample_rate: u32,
    }

    impl RecordingSynth {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fail_on: Vec::new(),
                sample_rate: 24000,
            }
        }
    }

    impl SpeechSynthesizer for RecordingSynth {
        fn synthesize(
            &mut self,
            text: &str,
            style_id: u32,
            params: Option<&VoiceParams>,
        ) -> Result<AudioBuffer, TtsError> {
            let call = self.calls.len();
            self.calls.push((text.to_string(), style_id, params.copied()));
            if self.fail_on.contains(&call) {
                return Err(TtsError::Connection("refused".to_string()));
            }
            let samples = (0..2400).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
            Ok(AudioBuffer::new(samples, self.sample_rate))
        }

        fn engine_name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn override_replaces_style_id_but_keeps_params() {
        let config = SynthesisConfig::default();
        let mut orchestrator =
            SynthesisOrchestrator::new(RecordingSynth::new(), &config, Arc::new(NoopEventSink));
        let segments = [
            Segment::new("嬉しい", EmotionScores::one_hot(EmotionLabel::Joy)).with_speaker(7),
        ];
        orchestrator.run(&segments).unwrap();

        let (_, style_id, params) = &orchestrator.synthesizer().calls[0];
        assert_eq!(*style_id, 7);
        assert_eq!(params.unwrap().speed_scale, 1.1);
    }

    #[test]
    fn adjustment_is_applied_to_mixed_params() {
        let config = SynthesisConfig::default();
        let mut orchestrator =
            SynthesisOrchestrator::new(RecordingSynth::new(), &config, Arc::new(NoopEventSink));
        let adjustment = ParamAdjustment {
            speed_scale: Some(1.5),
            ..Default::default()
        };
        let segments = [Segment::new("速く", EmotionScores::one_hot(EmotionLabel::Joy))
            .with_adjustment(adjustment)];
        orchestrator.run(&segments).unwrap();

        let (_, _, params) = &orchestrator.synthesizer().calls[0];
        assert!((params.unwrap().speed_scale - 1.65).abs() < 1e-9);
    }

    #[test]
    fn stop_before_run_reports_stopped() {
        let config = SynthesisConfig::default();
        let mut orchestrator =
            SynthesisOrchestrator::new(RecordingSynth::new(), &config, Arc::new(NoopEventSink));
        orchestrator.stop_handle().stop();

        let result = orchestrator.run(&[Segment::new("a", EmotionScores::zeros())]);
        assert!(matches!(result, Err(PipelineError::Stopped)));
        assert_eq!(orchestrator.state(), SynthesisState::Failed);
        assert!(orchestrator.synthesizer().calls.is_empty());
    }

    #[test]
    fn stop_after_first_segment_keeps_partial_output() {
        /// Stops the run as soon as the first segment is ready
        #[derive(Default)]
        struct StopAfterFirst(Mutex<Option<StopHandle>>);
        impl SynthesisEventSink for StopAfterFirst {
            fn on_event(&self, event: SynthesisEvent) {
                if let SynthesisEvent::SegmentSynthesized { .. } = event {
                    if let Some(handle) = self.0.lock().as_ref() {
                        handle.stop();
                    }
                }
            }
        }

        let config = SynthesisConfig::default();
        let sink = Arc::new(StopAfterFirst::default());
        let mut orchestrator =
            SynthesisOrchestrator::new(RecordingSynth::new(), &config, sink.clone());
        *sink.0.lock() = Some(orchestrator.stop_handle());

        let segments = [
            Segment::new("一", EmotionScores::zeros()).with_name("first"),
            Segment::new("二", EmotionScores::zeros()),
            Segment::new("三", EmotionScores::zeros()),
        ];
        let output = orchestrator.run(&segments).unwrap();

        assert!(output.stopped);
        assert_eq!(output.segments_synthesized, 1);
        assert_eq!(output.segments_failed, 0);
        assert_eq!(output.audio.len(), 2400);
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].name.as_deref(), Some("first"));
        assert_eq!(orchestrator.synthesizer().calls.len(), 1);
        assert_eq!(orchestrator.state(), SynthesisState::Done);
    }

    #[test]
    fn segment_audio_keeps_input_indices() {
        let config = SynthesisConfig::default();
        let mut synth = RecordingSynth::new();
        synth.fail_on = vec![1];
        let mut orchestrator = SynthesisOrchestrator::new(synth, &config, Arc::new(NoopEventSink));
        let segments = [
            Segment::new("a", EmotionScores::zeros()).with_name("0000_a"),
            Segment::new("  ", EmotionScores::zeros()),
            Segment::new("b", EmotionScores::zeros()),
            Segment::new("c", EmotionScores::zeros()).with_name("0003_c"),
        ];
        let output = orchestrator.run(&segments).unwrap();

        let indices: Vec<usize> = output.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(output.segments[1].name.as_deref(), Some("0003_c"));
        assert!(output.segments.iter().all(|s| s.audio.len() == 2400));
        assert_eq!(output.segments_failed, 1);
        assert_eq!(output.segments_skipped, 1);
    }

    #[test]
    fn stop_handle_is_shared_between_clones() {
        let handle = StopHandle::default();
        let clone = handle.clone();
        assert!(!clone.is_stopped());
        handle.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn mismatched_rate_is_resampled_to_first() {
        struct TwoRates(usize);
        impl SpeechSynthesizer for TwoRates {
            fn synthesize(
                &mut self,
                _text: &str,
                _style_id: u32,
                _params: Option<&VoiceParams>,
            ) -> Result<AudioBuffer, TtsError> {
                self.0 += 1;
                let rate = if self.0 == 1 { 24000 } else { 48000 };
                Ok(AudioBuffer::new(vec![0.2; 4800], rate))
            }

            fn engine_name(&self) -> &str {
                "two-rates"
            }
        }

        let config = SynthesisConfig::default();
        let mut orchestrator =
            SynthesisOrchestrator::new(TwoRates(0), &config, Arc::new(NoopEventSink));
        let segments = [
            Segment::new("one", EmotionScores::zeros()),
            Segment::new("two", EmotionScores::zeros()),
        ];
        let output = orchestrator.run(&segments).unwrap();
        assert_eq!(output.audio.sample_rate, 24000);
        // 4800 + 800 silence + ~2400 resampled
        assert!(output.audio.len() < 4800 + 800 + 4800);
    }

    #[test]
    fn empty_audio_counts_as_failure() {
        struct Silent;
        impl SpeechSynthesizer for Silent {
            fn synthesize(
                &mut self,
                _text: &str,
                _style_id: u32,
                _params: Option<&VoiceParams>,
            ) -> Result<AudioBuffer, TtsError> {
                Ok(AudioBuffer::empty(24000))
            }

            fn engine_name(&self) -> &str {
                "silent"
            }
        }

        let config = SynthesisConfig::default();
        let mut orchestrator = SynthesisOrchestrator::new(Silent, &config, Arc::new(NoopEventSink));
        let result = orchestrator.run(&[Segment::new("a", EmotionScores::zeros())]);
        assert!(matches!(
            result,
            Err(PipelineError::AllSegmentsFailed { attempted: 1 })
        ));
    }

    #[test]
    fn run_to_sink_writes_output() {
        #[derive(Default)]
        struct Capture(Option<usize>);
        impl AudioSink for Capture {
            fn write(&mut self, audio: &AudioBuffer) -> Result<(), crate::output::OutputError> {
                self.0 = Some(audio.len());
                Ok(())
            }
        }

        let config = SynthesisConfig::default();
        let mut orchestrator =
            SynthesisOrchestrator::new(RecordingSynth::new(), &config, Arc::new(LogEventSink));
        let mut sink = Capture::default();
        let output = orchestrator
            .run_to_sink(&[Segment::new("a", EmotionScores::zeros())], &mut sink)
            .unwrap();
        assert_eq!(sink.0, Some(output.audio.len()));
        assert_eq!(orchestrator.state(), SynthesisState::Done);
    }
}
