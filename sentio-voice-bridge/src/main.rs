mod audio;
mod protocol;

use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use audio::{
    decode_audio_buffer, encode_bytes_to_base64, encode_f32le_to_base64, AudioPayload,
    DEFAULT_CHANNELS,
};
use parking_lot::Mutex;
use protocol::{
    ErrorCode, EventEnvelope, RequestEnvelope, ResponseEnvelope, RpcError, RpcMethod,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use sentio_voice::audio_processor::resample;
use sentio_voice::output::default_output_path;
use sentio_voice::{
    save_segment_files, AivisClient, AudioBuffer, AudioProcessor, AudioQualityGate,
    DialogueScript, EmotionLabel, EmotionScores, EmotionVoiceMapper, PipelineError,
    PreprocessingOptions, Segment, SpeakerMapping, SynthesisConfig, SynthesisEvent,
    SynthesisEventSink, SynthesisOrchestrator, SynthesisOutput, TtsError, VoiceStyle,
    WavBytesSink, WavFileSink,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const UNKNOWN_REQUEST_ID: &str = "_unknown";
const MAX_TIMEOUT_MS: u64 = 5 * 60 * 1000;
const CONFIG_ENV: &str = "SENTIO_VOICE_CONFIG";

struct BridgeState {
    config: SynthesisConfig,
    mapper: EmotionVoiceMapper,
    processor: AudioProcessor,
    quality_gate: AudioQualityGate,
}

impl BridgeState {
    fn new(config: SynthesisConfig) -> Self {
        Self {
            mapper: EmotionVoiceMapper::from_config(&config),
            processor: AudioProcessor::new(config.audio.clone()),
            quality_gate: AudioQualityGate::from_config(&config.audio),
            config,
        }
    }

    fn engine_client(&self) -> Result<AivisClient, RpcError> {
        AivisClient::new(&self.config.engine, self.config.output_sample_rate)
            .map_err(map_tts_error)
    }
}

struct MethodOutcome {
    result: Value,
    should_shutdown: bool,
}

/// Buffers pipeline events until the run returns; stdout is only written
/// from the request loop
#[derive(Default)]
struct CollectingEventSink {
    events: Mutex<Vec<SynthesisEvent>>,
}

impl CollectingEventSink {
    fn drain(&self) -> Vec<SynthesisEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl SynthesisEventSink for CollectingEventSink {
    fn on_event(&self, event: SynthesisEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuntimeHelloParams {
    engine_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmotionMapParams {
    /// Eight classifier scores in label order
    scores: Option<Vec<f64>>,
    /// Scores keyed by emotion name
    emotions: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct AudioCheckParams {
    #[serde(flatten)]
    audio: AudioPayload,
}

#[derive(Debug, Deserialize)]
struct AudioProcessParams {
    #[serde(flatten)]
    audio: AudioPayload,
    #[serde(default = "default_true")]
    trim: bool,
    #[serde(default)]
    preprocessing: Option<PreprocessingOptions>,
    #[serde(default)]
    target_sample_rate_hz: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SegmentParams {
    text: String,
    #[serde(flatten)]
    emotion: EmotionMapParams,
    #[serde(default)]
    speaker: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SynthesisRunParams {
    segments: Vec<SegmentParams>,
    dialogue_path: Option<String>,
    speaker_mapping: Option<SpeakerMapping>,
    speaker_mapping_path: Option<String>,
    start: Option<usize>,
    end: Option<usize>,
    /// WAV destination; "auto" picks a timestamped name
    output_path: Option<String>,
    /// Inline result encoding: "f32le" samples or a "wav" file
    format: Option<String>,
    /// Directory for one WAV per synthesized segment
    segments_dir: Option<String>,
}

/// Where synthesis.run puts the combined waveform
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunTarget {
    Samples,
    Wav,
    File(PathBuf),
}

impl RunTarget {
    fn from_params(output_path: Option<String>, format: Option<&str>) -> Result<Self, RpcError> {
        let format = format.map(str::trim).unwrap_or("f32le").to_ascii_lowercase();
        if format != "f32le" && format != "wav" {
            return Err(RpcError::new(
                ErrorCode::UnsupportedAudioFormat,
                format!("Unsupported output format '{format}'"),
            ));
        }

        Ok(match normalize_optional_string(output_path) {
            Some(path) if path.eq_ignore_ascii_case("auto") => Self::File(default_output_path()),
            Some(path) => Self::File(PathBuf::from(path)),
            None if format == "wav" => Self::Wav,
            None => Self::Samples,
        })
    }
}

fn default_true() -> bool {
    true
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("[bridge] fatal error: {err}");
        std::process::exit(1);
    }
}

fn run() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut state = BridgeState::new(load_config_from_env());

    for line_result in stdin.lock().lines() {
        let line = match line_result {
            Ok(line) => line,
            Err(err) => {
                eprintln!("[bridge] stdin read error: {err}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let fallback_id =
            extract_request_id(&line).unwrap_or_else(|| UNKNOWN_REQUEST_ID.to_string());
        let started = Instant::now();

        let (response, should_shutdown) = if line.len() > MAX_REQUEST_BYTES {
            (
                ResponseEnvelope::err(
                    fallback_id,
                    RpcError::new(
                        ErrorCode::PayloadTooLarge,
                        format!(
                            "Request exceeds max size ({} > {})",
                            line.len(),
                            MAX_REQUEST_BYTES
                        ),
                    ),
                ),
                false,
            )
        } else {
            handle_line(&line, &mut state, &mut stdout)
        };

        write_response(&mut stdout, &response)?;

        let latency_ms = started.elapsed().as_millis();
        eprintln!(
            "[bridge] id={} ok={} latency_ms={latency_ms}",
            response.id, response.ok
        );

        if should_shutdown {
            break;
        }
    }

    Ok(())
}

fn load_config_from_env() -> SynthesisConfig {
    let Ok(path) = env::var(CONFIG_ENV) else {
        return SynthesisConfig::load();
    };
    let path = path.trim();
    if path.is_empty() {
        return SynthesisConfig::load();
    }

    match SynthesisConfig::from_json_file(path) {
        Ok(config) => {
            eprintln!("[bridge] config from env: {path}");
            config
        }
        Err(err) => {
            eprintln!("[bridge] config from env failed ({err}), using defaults");
            SynthesisConfig::default()
        }
    }
}

fn handle_line(
    line: &str,
    state: &mut BridgeState,
    stdout: &mut dyn Write,
) -> (ResponseEnvelope, bool) {
    let json_value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            let id = extract_request_id(line).unwrap_or_else(|| UNKNOWN_REQUEST_ID.to_string());
            return (
                ResponseEnvelope::err(
                    id,
                    RpcError::new(
                        ErrorCode::ParseError,
                        format!("Invalid JSON request: {err}"),
                    ),
                ),
                false,
            );
        }
    };

    let request_id = json_value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(UNKNOWN_REQUEST_ID)
        .to_string();

    let request: RequestEnvelope = match serde_json::from_value(json_value) {
        Ok(request) => request,
        Err(err) => {
            return (
                ResponseEnvelope::err(
                    request_id,
                    RpcError::new(
                        ErrorCode::InvalidRequest,
                        format!("Invalid request envelope: {err}"),
                    ),
                ),
                false,
            );
        }
    };

    if request.message_type != "request" {
        return (
            ResponseEnvelope::err(
                request.id,
                RpcError::new(
                    ErrorCode::InvalidRequest,
                    format!(
                        "Unsupported message type '{}' (expected 'request')",
                        request.message_type
                    ),
                ),
            ),
            false,
        );
    }

    if request.id.trim().is_empty() {
        return (
            ResponseEnvelope::err(
                request.id,
                RpcError::new(ErrorCode::InvalidRequest, "Request id must not be empty"),
            ),
            false,
        );
    }

    let method = match RpcMethod::from_str(&request.method) {
        Ok(method) => method,
        Err(err) => return (ResponseEnvelope::err(request.id, err), false),
    };

    if request.timeout_ms == Some(0) {
        return (
            ResponseEnvelope::err(
                request.id,
                RpcError::new(
                    ErrorCode::InvalidParams,
                    "timeout_ms must be greater than 0",
                ),
            ),
            false,
        );
    }

    let started = Instant::now();
    let outcome = dispatch_request(state, method, request.params, &request.id, stdout);
    if let Some(timeout_ms) = request.timeout_ms {
        let bounded_ms = timeout_ms.min(MAX_TIMEOUT_MS);
        if started.elapsed().as_millis() > bounded_ms as u128 {
            return (
                ResponseEnvelope::err(
                    request.id,
                    RpcError::new(
                        ErrorCode::OperationTimeout,
                        format!("Request timed out after {}ms", bounded_ms),
                    ),
                ),
                false,
            );
        }
    }

    match outcome {
        Ok(outcome) => (
            ResponseEnvelope::ok(request.id, outcome.result),
            outcome.should_shutdown,
        ),
        Err(err) => (ResponseEnvelope::err(request.id, err), false),
    }
}

fn dispatch_request(
    state: &mut BridgeState,
    method: RpcMethod,
    params: Value,
    request_id: &str,
    stdout: &mut dyn Write,
) -> Result<MethodOutcome, RpcError> {
    let result = match method {
        RpcMethod::RuntimeHello => handle_runtime_hello(state, parse_params(params)?)?,
        RpcMethod::EmotionMap => handle_emotion_map(state, parse_params(params)?)?,
        RpcMethod::AudioCheck => handle_audio_check(state, parse_params(params)?)?,
        RpcMethod::AudioProcess => handle_audio_process(state, parse_params(params)?)?,
        RpcMethod::EngineHealth => handle_engine_health(state)?,
        RpcMethod::SynthesisRun => {
            handle_synthesis_run(state, parse_params(params)?, request_id, stdout)?
        }
        RpcMethod::RuntimeShutdown => {
            return Ok(MethodOutcome {
                result: json!({"shutting_down": true}),
                should_shutdown: true,
            })
        }
    };

    Ok(MethodOutcome {
        result,
        should_shutdown: false,
    })
}

fn handle_runtime_hello(
    state: &mut BridgeState,
    params: RuntimeHelloParams,
) -> Result<Value, RpcError> {
    if let Some(engine_url) = params.engine_url {
        let engine_url = engine_url.trim();
        if engine_url.is_empty() {
            return Err(RpcError::new(
                ErrorCode::InvalidParams,
                "engine_url must not be empty",
            ));
        }

        state.config.engine.base_url = engine_url.to_string();
        eprintln!("[bridge] engine_url overridden via runtime.hello: {engine_url}");
    }

    let emotions: Vec<&str> = EmotionLabel::ALL.iter().map(|l| l.as_str()).collect();
    let styles: Vec<Value> = VoiceStyle::ALL
        .iter()
        .map(|style| {
            json!({
                "name": style.as_str(),
                "style_id": state.mapper.profiles().get(*style).style_id
            })
        })
        .collect();

    Ok(json!({
        "protocol_version": PROTOCOL_VERSION,
        "bridge": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "methods": RpcMethod::supported(),
        "audio": {
            "default_input_format": "f32le",
            "supported_input_formats": ["f32le", "pcm_s16le"],
            "default_channels": DEFAULT_CHANNELS,
            "output_formats": ["f32le", "wav"],
            "output_sample_rate_hz": state.config.output_sample_rate
        },
        "engine": {
            "base_url": state.config.engine.base_url
        },
        "emotions": emotions,
        "styles": styles,
        "emotion_score_threshold": state.mapper.threshold()
    }))
}

fn handle_emotion_map(state: &BridgeState, params: EmotionMapParams) -> Result<Value, RpcError> {
    let scores = parse_scores(&params)?;
    let styles = state.mapper.convert_scores_to_style_map(&scores);
    let mixed = state.mapper.calculate_mixed_parameters(&styles);

    let weights: BTreeMap<&str, f64> = styles
        .iter()
        .map(|(style, weight)| (style.as_str(), *weight))
        .collect();

    Ok(json!({
        "styles": weights,
        "style": mixed.style.as_str(),
        "style_id": mixed.style_id,
        "params": mixed.params
    }))
}

fn handle_audio_check(state: &BridgeState, params: AudioCheckParams) -> Result<Value, RpcError> {
    let buffer = decode_audio_buffer(&params.audio)?;
    let report = state.quality_gate.inspect(&buffer.samples);

    Ok(json!({
        "acceptable": report.is_acceptable(),
        "rms": report.rms,
        "peak": report.peak,
        "dc_offset": report.dc_offset,
        "issues": report.issues,
        "sample_count": buffer.len(),
        "duration_ms": duration_ms_for_samples(buffer.len(), buffer.sample_rate)
    }))
}

fn handle_audio_process(
    state: &BridgeState,
    params: AudioProcessParams,
) -> Result<Value, RpcError> {
    let mut buffer = decode_audio_buffer(&params.audio)?;
    let input_samples = buffer.len();

    if params.trim {
        buffer = state.processor.trim_silence(buffer);
    }
    let options = params.preprocessing.unwrap_or(state.config.preprocessing);
    buffer = state.processor.apply_preprocessing(buffer, &options);

    if let Some(target) = params.target_sample_rate_hz {
        if target == 0 {
            return Err(RpcError::new(
                ErrorCode::InvalidParams,
                "target_sample_rate_hz must be greater than 0",
            ));
        }
        buffer = resample(buffer, target);
    }

    Ok(json!({
        "audio_b64": encode_f32le_to_base64(&buffer.samples),
        "format": "f32le",
        "sample_rate_hz": buffer.sample_rate,
        "channels": DEFAULT_CHANNELS,
        "input_sample_count": input_samples,
        "sample_count": buffer.len(),
        "duration_ms": duration_ms_for_samples(buffer.len(), buffer.sample_rate)
    }))
}

fn handle_engine_health(state: &BridgeState) -> Result<Value, RpcError> {
    let client = state.engine_client()?;
    let healthy = client.check_health();
    let version = if healthy { client.version().ok() } else { None };
    let speakers = if healthy { client.speakers().ok() } else { None };

    Ok(json!({
        "healthy": healthy,
        "base_url": client.base_url(),
        "version": version,
        "speakers": speakers
    }))
}

fn handle_synthesis_run(
    state: &BridgeState,
    mut params: SynthesisRunParams,
    request_id: &str,
    stdout: &mut dyn Write,
) -> Result<Value, RpcError> {
    let inline = std::mem::take(&mut params.segments);
    let segments = build_segments(inline, &params)?;
    if segments.is_empty() {
        return Err(RpcError::new(
            ErrorCode::InvalidParams,
            "synthesis.run needs at least one segment",
        ));
    }
    let target = RunTarget::from_params(params.output_path.take(), params.format.as_deref())?;
    let segments_dir = normalize_optional_string(params.segments_dir.take()).map(PathBuf::from);

    let client = state.engine_client()?;
    if !client.check_health() {
        return Err(RpcError::new(
            ErrorCode::EngineUnavailable,
            format!("Speech engine not reachable at {}", client.base_url()),
        ));
    }

    let sink = Arc::new(CollectingEventSink::default());
    let mut orchestrator = SynthesisOrchestrator::with_mapper(
        client,
        state.mapper.clone(),
        &state.config,
        sink.clone(),
    );

    let mut wav_sink = WavBytesSink::default();
    let outcome = match &target {
        RunTarget::File(path) => orchestrator.run_to_sink(&segments, &mut WavFileSink::new(path)),
        RunTarget::Wav => orchestrator.run_to_sink(&segments, &mut wav_sink),
        RunTarget::Samples => orchestrator.run(&segments),
    };

    for event in sink.drain() {
        if let Some(data) = segment_event_json(&event) {
            write_event(
                stdout,
                &EventEnvelope::new(request_id, "synthesis.segment", data),
            )
            .map_err(|err| {
                RpcError::new(
                    ErrorCode::InternalError,
                    format!("Failed to emit synthesis.segment event: {err}"),
                )
            })?;
        }
    }

    let output = outcome.map_err(map_pipeline_error)?;
    let mut result = synthesis_result(&output, &target, &wav_sink.bytes);
    if let Some(dir) = segments_dir {
        let files = save_segment_files(&dir, &output.segments).map_err(|err| {
            RpcError::new(
                ErrorCode::InternalError,
                format!("Failed to write segment files: {err}"),
            )
        })?;
        result["segment_files"] = json!(files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>());
    }
    Ok(result)
}

fn build_segments(
    inline: Vec<SegmentParams>,
    params: &SynthesisRunParams,
) -> Result<Vec<Segment>, RpcError> {
    let Some(path) = params.dialogue_path.as_deref() else {
        let mut segments = Vec::with_capacity(inline.len());
        for segment in inline {
            let scores = parse_scores(&segment.emotion)?;
            let mut built = Segment::new(segment.text, scores);
            if let Some(speaker) = segment.speaker {
                built = built.with_speaker(speaker);
            }
            segments.push(built);
        }
        return Ok(segments);
    };

    if !inline.is_empty() {
        return Err(RpcError::new(
            ErrorCode::InvalidParams,
            "Pass either segments or dialogue_path, not both",
        ));
    }

    let script = DialogueScript::from_json_file(path)
        .map_err(|err| RpcError::new(ErrorCode::InvalidParams, err.to_string()))?;
    let mapping = load_speaker_mapping(params)?;
    Ok(script.segments_between(
        params.start.unwrap_or(0),
        params.end.unwrap_or(usize::MAX),
        &mapping,
    ))
}

/// Inline mapping or mapping file; neither means every line uses the normal voice
fn load_speaker_mapping(params: &SynthesisRunParams) -> Result<SpeakerMapping, RpcError> {
    match (&params.speaker_mapping, params.speaker_mapping_path.as_deref()) {
        (Some(_), Some(_)) => Err(RpcError::new(
            ErrorCode::InvalidParams,
            "Pass either speaker_mapping or speaker_mapping_path, not both",
        )),
        (Some(mapping), None) => Ok(mapping.clone()),
        (None, Some(path)) => SpeakerMapping::from_json_file(Path::new(path))
            .map_err(|err| RpcError::new(ErrorCode::InvalidParams, err.to_string())),
        (None, None) => Ok(SpeakerMapping::default()),
    }
}

fn parse_scores(params: &EmotionMapParams) -> Result<EmotionScores, RpcError> {
    if let Some(values) = &params.scores {
        return EmotionScores::from_slice(values).ok_or_else(|| {
            RpcError::new(
                ErrorCode::InvalidParams,
                format!("scores must hold 8 values, got {}", values.len()),
            )
        });
    }

    let mut scores = EmotionScores::zeros();
    if let Some(emotions) = &params.emotions {
        for (name, score) in emotions {
            let label = EmotionLabel::from_name(name).ok_or_else(|| {
                RpcError::new(ErrorCode::InvalidParams, format!("Unknown emotion '{name}'"))
            })?;
            scores.set(label, *score);
        }
    }
    Ok(scores)
}

fn segment_event_json(event: &SynthesisEvent) -> Option<Value> {
    match event {
        SynthesisEvent::SegmentSynthesized {
            index,
            style,
            style_id,
            duration_secs,
            sample_rate,
        } => Some(json!({
            "index": index,
            "status": "synthesized",
            "style": style.as_str(),
            "style_id": style_id,
            "duration_ms": (*duration_secs as f64 * 1000.0).round() as u64,
            "sample_rate_hz": sample_rate
        })),
        SynthesisEvent::SegmentFailed {
            index,
            message,
            retryable,
        } => Some(json!({
            "index": index,
            "status": "failed",
            "message": message,
            "retryable": retryable
        })),
        SynthesisEvent::SegmentSkipped { index } => Some(json!({
            "index": index,
            "status": "skipped"
        })),
        SynthesisEvent::QualityWarning { index, issues } => Some(json!({
            "index": index,
            "status": "quality_warning",
            "issues": issues
        })),
        SynthesisEvent::StateChanged { .. } | SynthesisEvent::Completed { .. } => None,
    }
}

fn synthesis_result(output: &SynthesisOutput, target: &RunTarget, wav_bytes: &[u8]) -> Value {
    let audio: &AudioBuffer = &output.audio;
    let mut result = json!({
        "format": "f32le",
        "sample_rate_hz": audio.sample_rate,
        "channels": DEFAULT_CHANNELS,
        "sample_count": audio.len(),
        "duration_ms": duration_ms_for_samples(audio.len(), audio.sample_rate),
        "segments_synthesized": output.segments_synthesized,
        "segments_failed": output.segments_failed,
        "segments_skipped": output.segments_skipped,
        "stopped": output.stopped
    });

    match target {
        RunTarget::File(path) => result["output_path"] = json!(path.display().to_string()),
        RunTarget::Wav => {
            result["format"] = json!("wav");
            result["audio_b64"] = json!(encode_bytes_to_base64(wav_bytes));
        }
        RunTarget::Samples => {
            result["audio_b64"] = json!(encode_f32le_to_base64(&audio.samples))
        }
    }
    result
}

fn duration_ms_for_samples(sample_count: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        0
    } else {
        (sample_count as u64 * 1000) / sample_rate as u64
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };

    serde_json::from_value(params)
        .map_err(|err| RpcError::new(ErrorCode::InvalidParams, format!("Invalid params: {err}")))
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn map_tts_error(err: TtsError) -> RpcError {
    match err {
        TtsError::Connection(msg) => RpcError::new(ErrorCode::EngineUnavailable, msg),
        other => RpcError::new(ErrorCode::InternalError, other.to_string()),
    }
}

fn map_pipeline_error(err: PipelineError) -> RpcError {
    match err {
        PipelineError::NoSegments => RpcError::new(ErrorCode::InvalidParams, err.to_string()),
        PipelineError::AllSegmentsFailed { .. } | PipelineError::Stopped => {
            RpcError::new(ErrorCode::SynthesisFailed, err.to_string())
        }
        PipelineError::Output(_) => RpcError::new(ErrorCode::InternalError, err.to_string()),
    }
}

fn extract_request_id(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    value.get("id")?.as_str().map(ToString::to_string)
}

fn write_response(stdout: &mut dyn Write, response: &ResponseEnvelope) -> io::Result<()> {
    let encoded = serde_json::to_string(response).map_err(io::Error::other)?;
    writeln!(stdout, "{encoded}")?;
    stdout.flush()
}

fn write_event(stdout: &mut dyn Write, event: &EventEnvelope) -> io::Result<()> {
    let encoded = serde_json::to_string(event).map_err(io::Error::other)?;
    writeln!(stdout, "{encoded}")?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> BridgeState {
        BridgeState::new(SynthesisConfig::default())
    }

    #[test]
    fn parse_scores_accepts_vector_or_names() {
        let by_vector = EmotionMapParams {
            scores: Some(vec![0.0, 0.0, 0.0, 0.0, 0.9, 0.0, 0.0, 0.1]),
            emotions: None,
        };
        let scores = parse_scores(&by_vector).unwrap();
        assert_eq!(scores.get(EmotionLabel::Anger), 0.9);

        let by_name = EmotionMapParams {
            scores: None,
            emotions: Some(BTreeMap::from([("怒り".to_string(), 0.9)])),
        };
        assert_eq!(parse_scores(&by_name).unwrap().get(EmotionLabel::Anger), 0.9);
    }

    #[test]
    fn parse_scores_rejects_bad_input() {
        let short = EmotionMapParams {
            scores: Some(vec![0.5; 3]),
            emotions: None,
        };
        assert_eq!(parse_scores(&short).unwrap_err().code, ErrorCode::InvalidParams);

        let unknown = EmotionMapParams {
            scores: None,
            emotions: Some(BTreeMap::from([("boredom".to_string(), 1.0)])),
        };
        let err = parse_scores(&unknown).unwrap_err();
        assert!(err.message.contains("boredom"), "unexpected: {}", err.message);
    }

    #[test]
    fn emotion_map_reports_dominant_style() {
        let params = EmotionMapParams {
            scores: Some(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            emotions: None,
        };
        let result = handle_emotion_map(&state(), params).unwrap();
        assert_eq!(result["style"], "joy");
        assert_eq!(result["style_id"], 888753764);
        assert_eq!(result["styles"]["joy"], 1.0);
        assert_eq!(result["params"]["speedScale"], 1.1);
    }

    #[test]
    fn emotion_map_falls_back_to_normal() {
        let result = handle_emotion_map(&state(), EmotionMapParams::default()).unwrap();
        assert_eq!(result["style"], "normal");
        assert_eq!(result["styles"]["normal"], 1.0);
    }

    #[test]
    fn segment_events_skip_state_changes() {
        let skipped = SynthesisEvent::SegmentSkipped { index: 2 };
        assert_eq!(segment_event_json(&skipped).unwrap()["status"], "skipped");

        let state_change = SynthesisEvent::StateChanged {
            state: sentio_voice::SynthesisState::Combining,
        };
        assert!(segment_event_json(&state_change).is_none());
    }

    #[test]
    fn run_target_resolves_format_and_path() {
        assert_eq!(RunTarget::from_params(None, None).unwrap(), RunTarget::Samples);
        assert_eq!(RunTarget::from_params(None, Some("WAV")).unwrap(), RunTarget::Wav);
        assert_eq!(
            RunTarget::from_params(Some(" out/a.wav ".into()), Some("wav")).unwrap(),
            RunTarget::File(PathBuf::from("out/a.wav"))
        );

        let RunTarget::File(auto) = RunTarget::from_params(Some("auto".into()), None).unwrap()
        else {
            panic!("auto should pick a file");
        };
        assert!(auto.to_string_lossy().starts_with("output_"));

        let err = RunTarget::from_params(None, Some("mp3")).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedAudioFormat);
    }

    #[test]
    fn speaker_mapping_sources_are_exclusive() {
        let params = SynthesisRunParams {
            speaker_mapping: Some(SpeakerMapping::default()),
            speaker_mapping_path: Some("mapping.json".to_string()),
            ..Default::default()
        };
        assert_eq!(
            load_speaker_mapping(&params).unwrap_err().code,
            ErrorCode::InvalidParams
        );

        let unmapped = load_speaker_mapping(&SynthesisRunParams::default()).unwrap();
        assert_eq!(unmapped.resolve("anyone", None), Some(888753761));
    }

    #[test]
    fn pipeline_errors_map_to_codes() {
        assert_eq!(
            map_pipeline_error(PipelineError::AllSegmentsFailed { attempted: 2 }).code,
            ErrorCode::SynthesisFailed
        );
        assert_eq!(
            map_pipeline_error(PipelineError::NoSegments).code,
            ErrorCode::InvalidParams
        );
        assert_eq!(
            map_tts_error(TtsError::Connection("refused".into())).code,
            ErrorCode::EngineUnavailable
        );
    }
}
