//! Inference engine seams
//!
//! Each model family sits behind a small async trait so the gateway never
//! depends on a concrete runtime. The `EngineFactory` performs the
//! expensive load; the deterministic stub backend ships as the default
//! factory and doubles as the test backend.

use std::sync::Arc;

use async_trait::async_trait;
use voxrelay_core::{
    AudioArtifact, Error, IsolateRequest, SfxRequest, SynthesizeRequest, TranscribeRequest,
    TranscribeTask, TranscriptSegment, Transcription, WordTiming,
};

use crate::audio::{self, STUB_SAMPLE_RATE};

#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn synthesize(&self, req: &SynthesizeRequest) -> Result<AudioArtifact, Error>;
}

#[async_trait]
pub trait SttEngine: Send + Sync {
    async fn transcribe(&self, req: &TranscribeRequest) -> Result<Transcription, Error>;
}

#[async_trait]
pub trait SfxEngine: Send + Sync {
    async fn generate(&self, req: &SfxRequest) -> Result<AudioArtifact, Error>;
}

#[async_trait]
pub trait SeparationEngine: Send + Sync {
    async fn separate(&self, req: &IsolateRequest) -> Result<AudioArtifact, Error>;
}

/// Materializes engines. Loading is expensive (weights on a device), so
/// the manager calls these at most once per engine.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn load_tts(&self) -> Result<Arc<dyn TtsEngine>, Error>;
    async fn load_stt(&self) -> Result<Arc<dyn SttEngine>, Error>;
    async fn load_sfx(&self) -> Result<Arc<dyn SfxEngine>, Error>;
    async fn load_separation(&self) -> Result<Arc<dyn SeparationEngine>, Error>;
    fn gpu_info(&self) -> serde_json::Value;
}

fn seed_from(bytes: &[u8]) -> u64 {
    // FNV-1a
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn tone(seed: u64, len: usize) -> Vec<i16> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 48) as i16
        })
        .collect()
}

fn artifact(samples: &[i16], sample_rate: u32) -> Result<AudioArtifact, Error> {
    let data = audio::encode_wav(samples, sample_rate)?;
    Ok(AudioArtifact {
        data,
        media_type: "audio/wav".to_string(),
        duration_secs: Some(samples.len() as f64 / sample_rate as f64),
        sample_rate: Some(sample_rate),
    })
}

/// Text-to-speech stub: a pseudo-random tone whose content and length are
/// functions of the input alone.
pub struct StubTtsEngine;

#[async_trait]
impl TtsEngine for StubTtsEngine {
    async fn synthesize(&self, req: &SynthesizeRequest) -> Result<AudioArtifact, Error> {
        let seed = seed_from(req.text.as_bytes()) ^ seed_from(req.language.as_bytes());
        // 50ms of audio per character, scaled by speed, capped at 30s.
        let base = req.text.chars().count().max(1) * STUB_SAMPLE_RATE as usize / 20;
        let len = ((base as f32 / req.speed.max(0.1)) as usize)
            .min(STUB_SAMPLE_RATE as usize * 30)
            .max(1);
        artifact(&tone(seed, len), STUB_SAMPLE_RATE)
    }
}

/// Speech-to-text stub: transcript derived from the payload size and
/// decoded duration.
pub struct StubSttEngine;

#[async_trait]
impl SttEngine for StubSttEngine {
    async fn transcribe(&self, req: &TranscribeRequest) -> Result<Transcription, Error> {
        let (sample_count, duration) = match audio::decode_wav(&req.audio) {
            Ok((samples, rate)) => {
                let duration = samples.len() as f64 / rate as f64;
                (samples.len(), duration)
            }
            // Non-WAV containers still transcribe; estimate from raw size.
            Err(_) => (
                req.audio.len() / 2,
                req.audio.len() as f64 / (2.0 * STUB_SAMPLE_RATE as f64),
            ),
        };

        let text = match req.task {
            TranscribeTask::Transcribe => format!("captured {sample_count} samples of speech"),
            TranscribeTask::Translate => format!("translated {sample_count} samples of speech"),
        };
        let language = req.language.clone().unwrap_or_else(|| "en".to_string());

        let word_count = text.split_whitespace().count().max(1);
        let step = duration / word_count as f64;
        let words = text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| WordTiming {
                word: w.to_string(),
                start: i as f64 * step,
                end: (i + 1) as f64 * step,
            })
            .collect();

        Ok(Transcription {
            segments: vec![TranscriptSegment {
                id: 0,
                start: 0.0,
                end: duration,
                text: text.clone(),
            }],
            words,
            text,
            language,
            duration,
        })
    }
}

/// Sound-effect stub: tone seeded by the prompt and parameters.
pub struct StubSfxEngine;

#[async_trait]
impl SfxEngine for StubSfxEngine {
    async fn generate(&self, req: &SfxRequest) -> Result<AudioArtifact, Error> {
        let seed = seed_from(req.prompt.as_bytes()) ^ req.num_inference_steps as u64;
        let len = ((req.duration * STUB_SAMPLE_RATE as f64) as usize).max(1);
        artifact(&tone(seed, len), STUB_SAMPLE_RATE)
    }
}

/// Separation stub: decodes the mix and attenuates it, standing in for
/// the extracted stem.
pub struct StubSeparationEngine;

#[async_trait]
impl SeparationEngine for StubSeparationEngine {
    async fn separate(&self, req: &IsolateRequest) -> Result<AudioArtifact, Error> {
        let (samples, rate) = audio::decode_wav(&req.audio)?;
        let stem: Vec<i16> = samples.iter().map(|&s| s / 2).collect();
        artifact(&stem, rate)
    }
}

/// Default factory: everything resolves to the deterministic stubs.
#[derive(Default)]
pub struct StubEngineFactory;

#[async_trait]
impl EngineFactory for StubEngineFactory {
    async fn load_tts(&self) -> Result<Arc<dyn TtsEngine>, Error> {
        Ok(Arc::new(StubTtsEngine))
    }

    async fn load_stt(&self) -> Result<Arc<dyn SttEngine>, Error> {
        Ok(Arc::new(StubSttEngine))
    }

    async fn load_sfx(&self) -> Result<Arc<dyn SfxEngine>, Error> {
        Ok(Arc::new(StubSfxEngine))
    }

    async fn load_separation(&self) -> Result<Arc<dyn SeparationEngine>, Error> {
        Ok(Arc::new(StubSeparationEngine))
    }

    fn gpu_info(&self) -> serde_json::Value {
        serde_json::json!({
            "available": false,
            "device": "cpu",
            "device_name": "deterministic stub",
        })
    }
}
