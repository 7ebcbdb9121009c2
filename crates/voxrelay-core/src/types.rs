//! Shared data types for VoxRelay
//!
//! Inference request/result shapes, operation classes, and the per-plan
//! rate-limit table.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Operation classes used for per-endpoint rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Tts,
    Stt,
    VoiceClone,
    Sfx,
    Isolation,
    Default,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Tts => "tts",
            OperationClass::Stt => "stt",
            OperationClass::VoiceClone => "voice_clone",
            OperationClass::Sfx => "sfx",
            OperationClass::Isolation => "isolation",
            OperationClass::Default => "default",
        }
    }
}

/// Subscription tiers recognized by the limit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Creator,
    Pro,
    Scale,
    Enterprise,
}

/// A {limit, window} pair from the plan table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitWindow {
    pub limit: u32,
    pub window_secs: u64,
}

impl PlanTier {
    /// Unrecognized plan names fall back to the free tier.
    pub fn from_name(name: &str) -> Self {
        match name {
            "starter" => PlanTier::Starter,
            "creator" => PlanTier::Creator,
            "pro" => PlanTier::Pro,
            "scale" => PlanTier::Scale,
            "enterprise" => PlanTier::Enterprise,
            _ => PlanTier::Free,
        }
    }

    /// Static limit table: (tier, operation class) -> {limit, window}.
    ///
    /// Voice cloning uses an hour-long window; everything else is
    /// per-minute. `Default` is the catch-all class for endpoints without
    /// a dedicated entry.
    pub fn rate_limit(&self, class: OperationClass) -> LimitWindow {
        use OperationClass::*;
        let (limit, window_secs) = match (self, class) {
            (PlanTier::Free, Tts) => (10, 60),
            (PlanTier::Free, Stt) => (5, 60),
            (PlanTier::Free, VoiceClone) => (2, 3600),
            (PlanTier::Free, Sfx) => (5, 60),
            (PlanTier::Free, Isolation) => (5, 60),
            (PlanTier::Free, Default) => (60, 60),
            (PlanTier::Starter, Tts) => (30, 60),
            (PlanTier::Starter, Stt) => (15, 60),
            (PlanTier::Starter, VoiceClone) => (10, 3600),
            (PlanTier::Starter, Sfx) => (15, 60),
            (PlanTier::Starter, Isolation) => (15, 60),
            (PlanTier::Starter, Default) => (120, 60),
            (PlanTier::Creator, Tts) => (60, 60),
            (PlanTier::Creator, Stt) => (30, 60),
            (PlanTier::Creator, VoiceClone) => (30, 3600),
            (PlanTier::Creator, Sfx) => (30, 60),
            (PlanTier::Creator, Isolation) => (30, 60),
            (PlanTier::Creator, Default) => (300, 60),
            (PlanTier::Pro, Tts) => (120, 60),
            (PlanTier::Pro, Stt) => (60, 60),
            (PlanTier::Pro, VoiceClone) => (100, 3600),
            (PlanTier::Pro, Sfx) => (60, 60),
            (PlanTier::Pro, Isolation) => (60, 60),
            (PlanTier::Pro, Default) => (600, 60),
            (PlanTier::Scale, Tts) => (300, 60),
            (PlanTier::Scale, Stt) => (150, 60),
            (PlanTier::Scale, VoiceClone) => (300, 3600),
            (PlanTier::Scale, Sfx) => (150, 60),
            (PlanTier::Scale, Isolation) => (150, 60),
            (PlanTier::Scale, Default) => (1200, 60),
            (PlanTier::Enterprise, Tts) => (1000, 60),
            (PlanTier::Enterprise, Stt) => (500, 60),
            (PlanTier::Enterprise, VoiceClone) => (1000, 3600),
            (PlanTier::Enterprise, Sfx) => (500, 60),
            (PlanTier::Enterprise, Isolation) => (500, 60),
            (PlanTier::Enterprise, Default) => (6000, 60),
        };
        LimitWindow { limit, window_secs }
    }
}

/// A text-to-speech request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_wav_url: Option<String>,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_output_format() -> String {
    "wav".to_string()
}

/// Whisper-style task selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscribeTask {
    Transcribe,
    Translate,
}

impl TranscribeTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscribeTask::Transcribe => "transcribe",
            TranscribeTask::Translate => "translate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "transcribe" => Some(TranscribeTask::Transcribe),
            "translate" => Some(TranscribeTask::Translate),
            _ => None,
        }
    }
}

/// A speech-to-text request. `filename` is a hint for container detection.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub audio: Bytes,
    pub filename: String,
    pub language: Option<String>,
    pub task: TranscribeTask,
}

/// A sound-effect generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfxRequest {
    pub prompt: String,
    #[serde(default = "default_sfx_duration")]
    pub duration: f64,
    #[serde(default = "default_sfx_steps")]
    pub num_inference_steps: u32,
}

fn default_sfx_duration() -> f64 {
    5.0
}

fn default_sfx_steps() -> u32 {
    100
}

/// A source-separation request.
#[derive(Debug, Clone)]
pub struct IsolateRequest {
    pub audio: Bytes,
    pub filename: String,
    pub stems: Vec<String>,
}

/// A voice-cloning request: several reference clips plus a display name.
#[derive(Debug, Clone)]
pub struct CloneVoiceRequest {
    pub audio_files: Vec<(String, Bytes)>,
    pub voice_name: String,
}

/// The closed set of inference operations VoxRelay dispatches.
///
/// Each value is constructed once per inbound request, owned by that
/// request's execution, and never mutated after construction.
#[derive(Debug, Clone)]
pub enum InferenceRequest {
    Synthesize(SynthesizeRequest),
    Transcribe(TranscribeRequest),
    GenerateSfx(SfxRequest),
    Isolate(IsolateRequest),
    CloneVoice(CloneVoiceRequest),
}

impl InferenceRequest {
    pub fn class(&self) -> OperationClass {
        match self {
            InferenceRequest::Synthesize(_) => OperationClass::Tts,
            InferenceRequest::Transcribe(_) => OperationClass::Stt,
            InferenceRequest::GenerateSfx(_) => OperationClass::Sfx,
            InferenceRequest::Isolate(_) => OperationClass::Isolation,
            InferenceRequest::CloneVoice(_) => OperationClass::VoiceClone,
        }
    }
}

/// Audio produced by an inference call, with whatever metadata the worker
/// could attach.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub data: Bytes,
    pub media_type: String,
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
}

/// One recognized span of speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One recognized word with timing, when the model emits word timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A structured transcription result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
    pub duration: f64,
}

/// What came back from a dispatched inference call.
#[derive(Debug, Clone)]
pub enum InferenceResult {
    Audio(AudioArtifact),
    Transcript(Transcription),
}
