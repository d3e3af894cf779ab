use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const PROTOCOL_VERSION: &str = "1.0.0";
pub const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            message_type: "response",
            id: id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, err: RpcError) -> Self {
        Self {
            message_type: "response",
            id: id.into(),
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: err.code.as_str(),
                message: err.message,
                retryable: err.retryable,
            }),
        }
    }
}

/// Progress notification tied to an in-flight request
#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub id: String,
    pub event: &'static str,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(id: impl Into<String>, event: &'static str, data: Value) -> Self {
        Self {
            message_type: "event",
            id: id.into(),
            event,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    InvalidParams,
    MethodNotFound,
    PayloadTooLarge,
    UnsupportedAudioFormat,
    AudioDecodeFailed,
    EngineUnavailable,
    SynthesisFailed,
    OperationTimeout,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedAudioFormat => "UNSUPPORTED_AUDIO_FORMAT",
            Self::AudioDecodeFailed => "AUDIO_DECODE_FAILED",
            Self::EngineUnavailable => "ENGINE_UNAVAILABLE",
            Self::SynthesisFailed => "SYNTHESIS_FAILED",
            Self::OperationTimeout => "OPERATION_TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn retryable(self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable | Self::OperationTimeout | Self::InternalError
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    RuntimeHello,
    EmotionMap,
    AudioCheck,
    AudioProcess,
    EngineHealth,
    SynthesisRun,
    RuntimeShutdown,
}

impl RpcMethod {
    pub fn supported() -> &'static [&'static str] {
        &[
            "runtime.hello",
            "emotion.map",
            "audio.check",
            "audio.process",
            "engine.health",
            "synthesis.run",
            "runtime.shutdown",
        ]
    }
}

impl FromStr for RpcMethod {
    type Err = RpcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "runtime.hello" => Ok(Self::RuntimeHello),
            "emotion.map" => Ok(Self::EmotionMap),
            "audio.check" => Ok(Self::AudioCheck),
            "audio.process" => Ok(Self::AudioProcess),
            "engine.health" => Ok(Self::EngineHealth),
            "synthesis.run" => Ok(Self::SynthesisRun),
            "runtime.shutdown" => Ok(Self::RuntimeShutdown),
            _ => Err(RpcError::new(
                ErrorCode::MethodNotFound,
                format!("Unknown method '{value}'"),
            )),
        }
    }
}
