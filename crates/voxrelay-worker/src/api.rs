//! Worker gateway HTTP surface
//!
//! All input validation happens before any model is touched: a malformed
//! request must never pay the model-load cost, and must come back 4xx so
//! callers do not retry it.

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, HeaderMap, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use voxrelay_core::{
    AudioArtifact, CloneVoiceRequest, IsolateRequest, SfxRequest, SynthesizeRequest,
    TranscribeRequest, TranscribeTask, Transcription,
};

use crate::audio;
use crate::error::ApiError;
use crate::state::WorkerState;

const MAX_TTS_TEXT_CHARS: usize = 5000;
const MAX_SFX_PROMPT_CHARS: usize = 500;
const SFX_DURATION_RANGE: std::ops::RangeInclusive<f64> = 1.0..=30.0;
const SFX_STEPS_RANGE: std::ops::RangeInclusive<u32> = 10..=200;

pub fn create_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tts/generate", post(generate_speech))
        .route("/stt/transcribe", post(transcribe))
        .route("/sfx/generate", post(generate_sfx))
        .route("/isolation/separate", post(separate))
        .route("/voice/clone", post(clone_voice))
        .route("/models/preload", get(preload_models))
        .route("/gpu/info", get(gpu_info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "gpu": state.manager.gpu_info(),
        "models_loaded": state.manager.loaded(),
    }))
}

async fn generate_speech(
    State(state): State<WorkerState>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<Response<Body>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("text must not be empty"));
    }
    if req.text.chars().count() > MAX_TTS_TEXT_CHARS {
        return Err(ApiError::bad_request(format!(
            "text exceeds {MAX_TTS_TEXT_CHARS} characters"
        )));
    }

    let artifact = state.manager.synthesize(&req).await?;
    audio_response(artifact, "speech.wav")
}

async fn transcribe(
    State(state): State<WorkerState>,
    mut multipart: Multipart,
) -> Result<Json<Transcription>, ApiError> {
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

    let transcript = state
        .manager
        .transcribe(&TranscribeRequest {
            audio,
            filename,
            language,
            task,
        })
        .await?;
    Ok(Json(transcript))
}

async fn generate_sfx(
    State(state): State<WorkerState>,
    Json(req): Json<SfxRequest>,
) -> Result<Response<Body>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    if req.prompt.chars().count() > MAX_SFX_PROMPT_CHARS {
        return Err(ApiError::bad_request(format!(
            "prompt exceeds {MAX_SFX_PROMPT_CHARS} characters"
        )));
    }
    if !SFX_DURATION_RANGE.contains(&req.duration) {
        return Err(ApiError::bad_request(
            "duration must be between 1.0 and 30.0 seconds",
        ));
    }
    if !SFX_STEPS_RANGE.contains(&req.num_inference_steps) {
        return Err(ApiError::bad_request(
            "num_inference_steps must be between 10 and 200",
        ));
    }

    let artifact = state.manager.generate_sfx(&req).await?;
    audio_response(artifact, "sfx.wav")
}

async fn separate(
    State(state): State<WorkerState>,
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

    let artifact = state
        .manager
        .separate(&IsolateRequest {
            audio,
            filename,
            stems,
        })
        .await?;
    audio_response(artifact, "vocals.wav")
}

async fn clone_voice(
    State(state): State<WorkerState>,
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
    if !voice_name.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Err(ApiError::bad_request(
            "voice_name must be printable ASCII",
        ));
    }
    if audio_files.is_empty() {
        return Err(ApiError::bad_request(
            "at least one reference audio file is required",
        ));
    }

    let idempotency_key = headers
        .get("X-Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(key) = &idempotency_key {
        if let Some(data) = state.clone_results.lock().await.get(key) {
            info!(voice_name, "returning cached clone result for replayed key");
            return clone_response(&voice_name, data);
        }
    }

    let request = CloneVoiceRequest {
        audio_files,
        voice_name: voice_name.clone(),
    };
    let data = audio::concat_wavs(&request.audio_files)?;

    if let Some(key) = idempotency_key {
        state.clone_results.lock().await.insert(key, data.clone());
    }
    clone_response(&voice_name, data)
}

async fn preload_models(State(state): State<WorkerState>) -> Json<serde_json::Value> {
    let manager = state.manager.clone();
    tokio::spawn(async move {
        let statuses = manager.preload_all().await;
        info!("model preload finished: {statuses}");
    });
    Json(json!({ "status": "preloading" }))
}

async fn gpu_info(State(state): State<WorkerState>) -> Json<serde_json::Value> {
    Json(state.manager.gpu_info())
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

fn audio_response(artifact: AudioArtifact, filename: &str) -> Result<Response<Body>, ApiError> {
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, artifact.media_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    if let Some(duration) = artifact.duration_secs {
        builder = builder.header("X-Audio-Duration-Secs", format!("{duration:.2}"));
    }
    if let Some(rate) = artifact.sample_rate {
        builder = builder.header("X-Sample-Rate", rate.to_string());
    }
    builder
        .body(Body::from(artifact.data))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

fn clone_response(voice_name: &str, data: Bytes) -> Result<Response<Body>, ApiError> {
    Response::builder()
        .header(header::CONTENT_TYPE, "audio/wav")
        .header("X-Voice-Name", voice_name)
        .body(Body::from(data))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}
