use std::time::Duration;

use bytes::Bytes;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::warn;
use voxrelay_core::{
    CloneVoiceRequest, Error, IsolateRequest, SfxRequest, SynthesizeRequest, TranscribeRequest,
    Transcription, WorkerConfig,
};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_PAUSE: Duration = Duration::from_millis(250);

/// Liveness snapshot of the worker. Returned as data, never raised: the
/// caller wants a degrade-gracefully signal, not an exception.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerHealth {
    pub status: String,
    #[serde(default)]
    pub gpu: Option<serde_json::Value>,
    #[serde(default)]
    pub models_loaded: Option<serde_json::Value>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl WorkerHealth {
    fn offline(detail: impl Into<String>) -> Self {
        Self {
            status: "offline".to_string(),
            gpu: None,
            models_loaded: None,
            detail: Some(detail.into()),
        }
    }
}

/// Voice-clone output: the combined reference audio the worker produced.
#[derive(Debug, Clone)]
pub struct ClonedVoice {
    pub voice_name: String,
    pub data: Bytes,
}

/// HTTP client for the remote GPU worker.
///
/// One instance per orchestrator process; holds a reusable connection
/// pool and no other mutable state. Every inference method checks the
/// `enabled` gate before any network I/O and retries transient failures
/// (connect errors, timeouts, 5xx) up to the configured ceiling. 4xx
/// responses are terminal: retrying without correcting the input cannot
/// succeed.
pub struct RemoteWorkerClient {
    config: WorkerConfig,
    http: Client,
}

impl RemoteWorkerClient {
    pub fn new(config: WorkerConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self, Error> {
        Self::new(WorkerConfig::from_env())
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn ensure_enabled(&self) -> Result<(), Error> {
        if !self.config.enabled {
            return Err(Error::Config(
                "remote worker not enabled; set GPU_WORKER_MODE=remote".to_string(),
            ));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bounded retry loop. The request is rebuilt per attempt (multipart
    /// bodies are consumed on send); the last observed failure is returned
    /// verbatim once attempts are exhausted.
    async fn send_with_retries<F>(&self, operation: &str, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match build(&self.http).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    if status.is_client_error() {
                        return Err(Error::Validation(format!(
                            "worker rejected {operation} ({status}): {body}"
                        )));
                    }
                    warn!(operation, attempt, %status, "worker returned an error status");
                    last_err = Some(if status == StatusCode::SERVICE_UNAVAILABLE {
                        Error::ResourceUnavailable(format!("{operation} ({status}): {body}"))
                    } else {
                        Error::Transient(format!("{operation} ({status}): {body}"))
                    });
                }
                Err(e) => {
                    warn!(operation, attempt, "worker request failed: {e}");
                    last_err = Some(Error::Transient(format!("{operation}: {e}")));
                }
            }
            if attempt < attempts {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Transient(format!("{operation}: no attempt completed"))))
    }

    async fn body_bytes(operation: &str, resp: Response) -> Result<Bytes, Error> {
        resp.bytes()
            .await
            .map_err(|e| Error::Transient(format!("{operation}: failed to read body: {e}")))
    }

    /// Generate speech from text. Returns raw audio bytes.
    pub async fn synthesize(&self, req: &SynthesizeRequest) -> Result<Bytes, Error> {
        self.ensure_enabled()?;
        let resp = self
            .send_with_retries("tts/generate", |http| {
                http.post(self.url("/tts/generate")).json(req)
            })
            .await?;
        Self::body_bytes("tts/generate", resp).await
    }

    /// Transcribe audio. Returns the structured transcript.
    pub async fn transcribe(&self, req: &TranscribeRequest) -> Result<Transcription, Error> {
        self.ensure_enabled()?;
        let resp = self
            .send_with_retries("stt/transcribe", |http| {
                let mut form = multipart::Form::new()
                    .part(
                        "audio",
                        multipart::Part::bytes(req.audio.to_vec()).file_name(req.filename.clone()),
                    )
                    .text("task", req.task.as_str());
                if let Some(language) = &req.language {
                    form = form.text("language", language.clone());
                }
                http.post(self.url("/stt/transcribe")).multipart(form)
            })
            .await?;
        resp.json().await.map_err(|e| {
            Error::Transient(format!("stt/transcribe: malformed transcript payload: {e}"))
        })
    }

    /// Generate a sound effect from a text prompt. Returns raw audio bytes.
    pub async fn generate_sfx(&self, req: &SfxRequest) -> Result<Bytes, Error> {
        self.ensure_enabled()?;
        let resp = self
            .send_with_retries("sfx/generate", |http| {
                http.post(self.url("/sfx/generate")).json(req)
            })
            .await?;
        Self::body_bytes("sfx/generate", resp).await
    }

    /// Separate stems from a mixed recording. Returns the vocal stem by
    /// default.
    pub async fn isolate(&self, req: &IsolateRequest) -> Result<Bytes, Error> {
        self.ensure_enabled()?;
        let stems = req.stems.join(",");
        let resp = self
            .send_with_retries("isolation/separate", |http| {
                let form = multipart::Form::new()
                    .part(
                        "audio",
                        multipart::Part::bytes(req.audio.to_vec()).file_name(req.filename.clone()),
                    )
                    .text("stems", stems.clone());
                http.post(self.url("/isolation/separate")).multipart(form)
            })
            .await?;
        Self::body_bytes("isolation/separate", resp).await
    }

    /// Create a voice clone from reference audio.
    ///
    /// Clone-voice is not idempotent server-side, so one idempotency key
    /// is generated per logical call and resent unchanged on every retry,
    /// letting the worker deduplicate partial successes.
    pub async fn clone_voice(&self, req: &CloneVoiceRequest) -> Result<ClonedVoice, Error> {
        self.ensure_enabled()?;
        let idempotency_key = uuid::Uuid::new_v4().to_string();

        let resp = self
            .send_with_retries("voice/clone", |http| {
                let mut form = multipart::Form::new().text("voice_name", req.voice_name.clone());
                for (filename, data) in &req.audio_files {
                    form = form.part(
                        "audio_files",
                        multipart::Part::bytes(data.to_vec()).file_name(filename.clone()),
                    );
                }
                http.post(self.url("/voice/clone"))
                    .header("X-Idempotency-Key", &idempotency_key)
                    .multipart(form)
            })
            .await?;

        let voice_name = resp
            .headers()
            .get("X-Voice-Name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&req.voice_name)
            .to_string();
        let data = Self::body_bytes("voice/clone", resp).await?;
        Ok(ClonedVoice { voice_name, data })
    }

    /// Liveness probe: short timeout, no retries, never raises.
    pub async fn health_check(&self) -> WorkerHealth {
        if !self.config.enabled {
            return WorkerHealth::offline("remote worker not enabled");
        }
        let result = self
            .http
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json()
                .await
                .unwrap_or_else(|e| WorkerHealth::offline(format!("malformed health payload: {e}"))),
            Ok(resp) => WorkerHealth::offline(format!("worker returned {}", resp.status())),
            Err(e) => WorkerHealth::offline(e.to_string()),
        }
    }

    /// Ask the worker to warm all models in the background.
    pub async fn preload_models(&self) -> serde_json::Value {
        if !self.config.enabled {
            return serde_json::json!({ "status": "disabled" });
        }
        match self.http.get(self.url("/models/preload")).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json()
                .await
                .unwrap_or_else(|e| serde_json::json!({ "status": "error", "error": e.to_string() })),
            Ok(resp) => serde_json::json!({ "status": "error", "error": resp.status().to_string() }),
            Err(e) => serde_json::json!({ "status": "error", "error": e.to_string() }),
        }
    }

    /// Device and memory telemetry from the worker.
    pub async fn gpu_info(&self) -> serde_json::Value {
        if !self.config.enabled {
            return serde_json::json!({ "status": "disabled" });
        }
        match self.http.get(self.url("/gpu/info")).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json()
                .await
                .unwrap_or_else(|e| serde_json::json!({ "status": "error", "error": e.to_string() })),
            Ok(resp) => serde_json::json!({ "status": "error", "error": resp.status().to_string() }),
            Err(e) => serde_json::json!({ "status": "error", "error": e.to_string() }),
        }
    }
}
