//! Core types, errors, and rate limiting for VoxRelay
//!
//! This crate contains the shared data structures, error taxonomy, worker
//! configuration, and the Redis-backed sliding-window rate limiter used
//! across the VoxRelay workspace.

pub mod config;
pub mod error;
pub mod rate_limiting;
pub mod types;

// Re-exports for convenient access
pub use config::WorkerConfig;
pub use error::Error;
pub use rate_limiting::{RateLimitDecision, RateLimiter};
pub use types::{
    AudioArtifact, CloneVoiceRequest, InferenceRequest, InferenceResult, IsolateRequest,
    LimitWindow, OperationClass, PlanTier, SfxRequest, SynthesizeRequest, TranscribeRequest,
    TranscribeTask, TranscriptSegment, Transcription, WordTiming,
};
