use parking_lot::Mutex;
use sentio_voice::pipeline::NoopEventSink;
use sentio_voice::{
    AudioBuffer, EmotionLabel, EmotionScores, PipelineError, Segment, SpeechSynthesizer,
    SynthesisConfig, SynthesisEvent, SynthesisEventSink, SynthesisOrchestrator, SynthesisState,
    TtsError, VoiceParams, WavFileSink,
};
use std::sync::Arc;

/// Answers each call with a tone whose length encodes the call order,
/// failing the calls listed in `fail_on`.
struct ScriptedSynth {
    calls: Vec<(String, u32)>,
    fail_on: Vec<usize>,
}

impl ScriptedSynth {
    fn new(fail_on: Vec<usize>) -> Self {
        Self {
            calls: Vec::new(),
            fail_on,
        }
    }
}

impl SpeechSynthesizer for ScriptedSynth {
    fn synthesize(
        &mut self,
        text: &str,
        style_id: u32,
        _params: Option<&VoiceParams>,
    ) -> Result<AudioBuffer, TtsError> {
        let call = self.calls.len();
        self.calls.push((text.to_string(), style_id));
        if self.fail_on.contains(&call) {
            return Err(TtsError::Http(format!("synthesis 500: call {call}")));
        }
        let len = 2400 * (call + 1);
        let samples = (0..len)
            .map(|i| (i as f32 * 0.07).sin() * 0.4)
            .collect();
        Ok(AudioBuffer::new(samples, 24000))
    }

    fn engine_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<SynthesisEvent>>,
}

impl SynthesisEventSink for CollectingSink {
    fn on_event(&self, event: SynthesisEvent) {
        self.events.lock().push(event);
    }
}

fn joy() -> EmotionScores {
    EmotionScores::one_hot(EmotionLabel::Joy)
}

#[test]
fn segments_are_combined_in_input_order() {
    let config = SynthesisConfig::default();
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![]), &config, Arc::new(NoopEventSink));
    let segments = vec![
        Segment::new("一つ目", joy()),
        Segment::new("二つ目", EmotionScores::one_hot(EmotionLabel::Sadness)),
        Segment::new("三つ目", EmotionScores::zeros()),
    ];

    let output = orchestrator.run(&segments).expect("run should succeed");
    let silence = config.audio.silence_duration;
    assert_eq!(output.segments_synthesized, 3);
    assert_eq!(output.audio.sample_rate, 24000);
    assert_eq!(output.audio.len(), 2400 + 4800 + 7200 + 2 * silence);

    // Silence windows sit right after the first and second segments
    let gap1 = 2400..2400 + silence;
    let gap2 = 2400 + silence + 4800..2400 + 2 * silence + 4800;
    assert!(output.audio.samples[gap1].iter().all(|&s| s == 0.0));
    assert!(output.audio.samples[gap2].iter().all(|&s| s == 0.0));

    let calls = &orchestrator.synthesizer().calls;
    assert_eq!(calls[0], ("一つ目".to_string(), 888753764));
    assert_eq!(calls[1], ("二つ目".to_string(), 888753765));
    assert_eq!(calls[2], ("三つ目".to_string(), 888753761));
    assert_eq!(orchestrator.state(), SynthesisState::Done);
}

#[test]
fn blank_segments_are_skipped_without_engine_calls() {
    let config = SynthesisConfig::default();
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![]), &config, Arc::new(NoopEventSink));
    let segments = vec![
        Segment::new("   ", joy()),
        Segment::new("こんにちは", joy()),
        Segment::new("", joy()),
    ];

    let output = orchestrator.run(&segments).unwrap();
    assert_eq!(output.segments_skipped, 2);
    assert_eq!(output.segments_synthesized, 1);
    assert_eq!(orchestrator.synthesizer().calls.len(), 1);
}

#[test]
fn failed_segments_do_not_abort_the_run() {
    let config = SynthesisConfig::default();
    let sink = Arc::new(CollectingSink::default());
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![1]), &config, sink.clone());
    let segments = vec![
        Segment::new("a", joy()),
        Segment::new("b", joy()),
        Segment::new("c", joy()),
    ];

    let output = orchestrator.run(&segments).unwrap();
    assert_eq!(output.segments_synthesized, 2);
    assert_eq!(output.segments_failed, 1);
    assert_eq!(
        output.audio.len(),
        2400 + 7200 + config.audio.silence_duration
    );

    let events = sink.events.lock();
    let failed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SynthesisEvent::SegmentFailed { index, retryable, .. } => {
                assert!(*retryable);
                Some(*index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![1]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SynthesisEvent::Completed { synthesized: 2, failed: 1, .. })));
}

#[test]
fn all_failures_report_total_failure() {
    let config = SynthesisConfig::default();
    let mut orchestrator = SynthesisOrchestrator::new(
        ScriptedSynth::new(vec![0, 1]),
        &config,
        Arc::new(NoopEventSink),
    );
    let segments = vec![Segment::new("a", joy()), Segment::new("b", joy())];

    match orchestrator.run(&segments) {
        Err(PipelineError::AllSegmentsFailed { attempted }) => assert_eq!(attempted, 2),
        other => panic!("expected total failure, got {other:?}"),
    }
    assert_eq!(orchestrator.state(), SynthesisState::Failed);
}

#[test]
fn only_blank_segments_report_no_segments() {
    let config = SynthesisConfig::default();
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![]), &config, Arc::new(NoopEventSink));
    assert!(matches!(
        orchestrator.run(&[Segment::new(" ", joy())]),
        Err(PipelineError::NoSegments)
    ));
    assert!(matches!(orchestrator.run(&[]), Err(PipelineError::NoSegments)));
}

#[test]
fn segments_are_preprocessed_before_combining() {
    let config = SynthesisConfig::default();
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![]), &config, Arc::new(NoopEventSink));
    let output = orchestrator
        .run(&[Segment::new("a", joy()), Segment::new("b", joy())])
        .unwrap();

    // Fades pull both segment edges to zero
    let samples = &output.audio.samples;
    assert_eq!(samples[0], 0.0);
    assert_eq!(samples[2399], 0.0);
    assert_eq!(*samples.last().unwrap(), 0.0);
}

#[test]
fn run_to_file_sink_writes_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("story.wav");
    let config = SynthesisConfig::default();
    let mut orchestrator =
        SynthesisOrchestrator::new(ScriptedSynth::new(vec![]), &config, Arc::new(NoopEventSink));
    let mut sink = WavFileSink::new(&path);

    let output = orchestrator
        .run_to_sink(&[Segment::new("a", joy())], &mut sink)
        .unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 24000);
    assert_eq!(reader.len() as usize, output.audio.len());
}
