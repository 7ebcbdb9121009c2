//! Orchestrator HTTP surface
//!
//! Every inference route follows the same shape: resolve the caller,
//! admit through the rate limiter, dispatch to the worker, attach the
//! advisory rate-limit headers, and record usage telemetry.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, State},
    http::{header, HeaderMap, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use voxrelay_core::{
    CloneVoiceRequest, InferenceRequest, InferenceResult, IsolateRequest, RateLimitDecision,
    SfxRequest, SynthesizeRequest, TranscribeRequest, TranscribeTask, Transcription,
};

use crate::dispatch::{admit, dispatch, resolve_caller};
use crate::error::ApiError;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/tts", post(tts))
        .route("/v1/stt", post(stt))
        .route("/v1/sfx", post(sfx))
        .route("/v1/isolation", post(isolation))
        .route("/v1/voice/clone", post(voice_clone))
        .route("/v1/worker/health", get(worker_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn worker_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.worker.health_check().await;
    Json(json!({
        "status": health.status,
        "gpu": health.gpu,
        "models_loaded": health.models_loaded,
        "detail": health.detail,
    }))
}

async fn tts(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SynthesizeRequest>,
) -> Result<Response<Body>, ApiError> {
    let payload_bytes = req.text.len();
    run_audio(
        &state,
        &headers,
        peer,
        InferenceRequest::Synthesize(req),
        payload_bytes,
        "speech.wav",
    )
    .await
}

async fn sfx(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SfxRequest>,
) -> Result<Response<Body>, ApiError> {
    let payload_bytes = req.prompt.len();
    run_audio(
        &state,
        &headers,
        peer,
        InferenceRequest::GenerateSfx(req),
        payload_bytes,
        "sfx.wav",
    )
    .await
}

async fn stt(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response<Body>, ApiError> {
    let mut audio = None;
    let mut filename = "audio.wav".to_string();
    let mut language = None;
    let mut task = TranscribeTask::Transcribe;

    while let Some(field) = next_field(&mut multipart).await? {
        match field.name().unwrap_or_default() {
            "audio" => {
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                audio = Some(field_bytes(field).await?);
            }
            "language" => {
                let value = field_text(field).await?;
                if !value.trim().is_empty() {
                    language = Some(value);
                }
            }
            "task" => {
                let value = field_text(field).await?;
                task = TranscribeTask::from_name(&value)
                    .ok_or_else(|| ApiError::bad_request(format!("unknown task '{value}'")))?;
            }
            _ => {}
        }
    }

    let audio = audio
        .filter(|a: &Bytes| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("audio file is required"))?;
    let payload_bytes = audio.len();

    let request = InferenceRequest::Transcribe(TranscribeRequest {
        audio,
        filename,
        language,
        task,
    });

    let caller = resolve_caller(&state, &headers, Some(peer)).await?;
    let decision = admit(&state, &caller, request.class()).await?;

    let started = Instant::now();
    let result = dispatch(&state, &request).await?;
    state.telemetry.record(
        &caller.identifier,
        request.class(),
        payload_bytes,
        started.elapsed().as_millis() as u64,
    );

    match result {
        InferenceResult::Transcript(transcript) => transcript_response(transcript, &decision),
        InferenceResult::Audio(_) => Err(ApiError::internal("unexpected audio result")),
    }
}

async fn isolation(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response<Body>, ApiError> {
    let mut audio = None;
    let mut filename = "mix.wav".to_string();
    let mut stems = vec!["vocals".to_string()];

    while let Some(field) = next_field(&mut multipart).await? {
        match field.name().unwrap_or_default() {
            "audio" => {
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                audio = Some(field_bytes(field).await?);
            }
            "stems" => {
                let value = field_text(field).await?;
                let requested: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if !requested.is_empty() {
                    stems = requested;
                }
            }
            _ => {}
        }
    }

    let audio = audio
        .filter(|a: &Bytes| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("audio file is required"))?;
    let payload_bytes = audio.len();

    run_audio(
        &state,
        &headers,
        peer,
        InferenceRequest::Isolate(IsolateRequest {
            audio,
            filename,
            stems,
        }),
        payload_bytes,
        "vocals.wav",
    )
    .await
}

async fn voice_clone(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response<Body>, ApiError> {
    let mut audio_files: Vec<(String, Bytes)> = Vec::new();
    let mut voice_name = String::new();

    while let Some(field) = next_field(&mut multipart).await? {
        match field.name().unwrap_or_default() {
            "audio_files" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("reference-{}.wav", audio_files.len()));
                let data = field_bytes(field).await?;
                if !data.is_empty() {
                    audio_files.push((filename, data));
                }
            }
            "voice_name" => voice_name = field_text(field).await?,
            _ => {}
        }
    }

    let voice_name = voice_name.trim().to_string();
    if voice_name.is_empty() {
        return Err(ApiError::bad_request("voice_name is required"));
    }
    if audio_files.is_empty() {
        return Err(ApiError::bad_request(
            "at least one reference audio file is required",
        ));
    }
    let payload_bytes: usize = audio_files.iter().map(|(_, data)| data.len()).sum();

    let request = InferenceRequest::CloneVoice(CloneVoiceRequest {
        audio_files,
        voice_name: voice_name.clone(),
    });

    let caller = resolve_caller(&state, &headers, Some(peer)).await?;
    let decision = admit(&state, &caller, request.class()).await?;

    let started = Instant::now();
    let result = dispatch(&state, &request).await?;
    state.telemetry.record(
        &caller.identifier,
        request.class(),
        payload_bytes,
        started.elapsed().as_millis() as u64,
    );

    match result {
        InferenceResult::Audio(artifact) => {
            let mut response = audio_response(artifact, "voice.wav", &decision)?;
            if let Ok(value) = voice_name.parse() {
                response.headers_mut().insert("X-Voice-Name", value);
            }
            Ok(response)
        }
        InferenceResult::Transcript(_) => Err(ApiError::internal("unexpected transcript result")),
    }
}

/// Shared path for the audio-producing endpoints.
async fn run_audio(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    request: InferenceRequest,
    payload_bytes: usize,
    filename: &str,
) -> Result<Response<Body>, ApiError> {
    let caller = resolve_caller(state, headers, Some(peer)).await?;
    let decision = admit(state, &caller, request.class()).await?;

    let started = Instant::now();
    let result = dispatch(state, &request).await?;
    state.telemetry.record(
        &caller.identifier,
        request.class(),
        payload_bytes,
        started.elapsed().as_millis() as u64,
    );

    match result {
        InferenceResult::Audio(artifact) => audio_response(artifact, filename, &decision),
        InferenceResult::Transcript(_) => Err(ApiError::internal("unexpected transcript result")),
    }
}

fn audio_response(
    artifact: voxrelay_core::AudioArtifact,
    filename: &str,
    decision: &RateLimitDecision,
) -> Result<Response<Body>, ApiError> {
    rate_limited_builder(decision)
        .header(header::CONTENT_TYPE, artifact.media_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(artifact.data))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

fn transcript_response(
    transcript: Transcription,
    decision: &RateLimitDecision,
) -> Result<Response<Body>, ApiError> {
    let body = serde_json::to_vec(&transcript)
        .map_err(|e| ApiError::internal(format!("failed to encode transcript: {e}")))?;
    rate_limited_builder(decision)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

/// Successful admissions advertise the live remaining count.
fn rate_limited_builder(decision: &RateLimitDecision) -> axum::http::response::Builder {
    Response::builder()
        .header("X-RateLimit-Limit", decision.limit.to_string())
        .header("X-RateLimit-Remaining", decision.remaining.to_string())
        .header("X-RateLimit-Reset", decision.reset_at.to_string())
}

async fn next_field(
    multipart: &mut Multipart,
) -> Result<Option<axum::extract::multipart::Field<'_>>, ApiError> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))
}

async fn field_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Bytes, ApiError> {
    field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable multipart field: {e}")))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable multipart field: {e}")))
}
