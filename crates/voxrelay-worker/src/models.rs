//! Lazy model loading and inference serialization
//!
//! Each engine is materialized at most once: concurrent first requests
//! collapse into a single factory call (`tokio::sync::OnceCell`), and a
//! failed load leaves the cell empty so the next request retries.
//! Inference on a given engine is serialized with a per-engine mutex; the
//! device cannot run two jobs of the same family at once.

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};
use voxrelay_core::{
    AudioArtifact, Error, IsolateRequest, SfxRequest, SynthesizeRequest, TranscribeRequest,
    Transcription,
};

use crate::engines::{EngineFactory, SeparationEngine, SfxEngine, SttEngine, TtsEngine};

pub struct ModelManager {
    factory: Arc<dyn EngineFactory>,
    tts: OnceCell<Arc<dyn TtsEngine>>,
    stt: OnceCell<Arc<dyn SttEngine>>,
    sfx: OnceCell<Arc<dyn SfxEngine>>,
    separation: OnceCell<Arc<dyn SeparationEngine>>,
    tts_gate: Mutex<()>,
    stt_gate: Mutex<()>,
    sfx_gate: Mutex<()>,
    separation_gate: Mutex<()>,
}

fn load_failure(family: &str, e: Error) -> Error {
    error!(family, "engine failed to load: {e}");
    Error::ResourceUnavailable(format!("{family} engine failed to load: {e}"))
}

impl ModelManager {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            tts: OnceCell::new(),
            stt: OnceCell::new(),
            sfx: OnceCell::new(),
            separation: OnceCell::new(),
            tts_gate: Mutex::new(()),
            stt_gate: Mutex::new(()),
            sfx_gate: Mutex::new(()),
            separation_gate: Mutex::new(()),
        }
    }

    async fn tts_engine(&self) -> Result<Arc<dyn TtsEngine>, Error> {
        self.tts
            .get_or_try_init(|| async {
                info!("loading tts engine");
                self.factory.load_tts().await.map_err(|e| load_failure("tts", e))
            })
            .await
            .cloned()
    }

    async fn stt_engine(&self) -> Result<Arc<dyn SttEngine>, Error> {
        self.stt
            .get_or_try_init(|| async {
                info!("loading stt engine");
                self.factory.load_stt().await.map_err(|e| load_failure("stt", e))
            })
            .await
            .cloned()
    }

    async fn sfx_engine(&self) -> Result<Arc<dyn SfxEngine>, Error> {
        self.sfx
            .get_or_try_init(|| async {
                info!("loading sfx engine");
                self.factory.load_sfx().await.map_err(|e| load_failure("sfx", e))
            })
            .await
            .cloned()
    }

    async fn separation_engine(&self) -> Result<Arc<dyn SeparationEngine>, Error> {
        self.separation
            .get_or_try_init(|| async {
                info!("loading separation engine");
                self.factory
                    .load_separation()
                    .await
                    .map_err(|e| load_failure("separation", e))
            })
            .await
            .cloned()
    }

    pub async fn synthesize(&self, req: &SynthesizeRequest) -> Result<AudioArtifact, Error> {
        let engine = self.tts_engine().await?;
        let _serial = self.tts_gate.lock().await;
        engine.synthesize(req).await
    }

    pub async fn transcribe(&self, req: &TranscribeRequest) -> Result<Transcription, Error> {
        let engine = self.stt_engine().await?;
        let _serial = self.stt_gate.lock().await;
        engine.transcribe(req).await
    }

    pub async fn generate_sfx(&self, req: &SfxRequest) -> Result<AudioArtifact, Error> {
        let engine = self.sfx_engine().await?;
        let _serial = self.sfx_gate.lock().await;
        engine.generate(req).await
    }

    pub async fn separate(&self, req: &IsolateRequest) -> Result<AudioArtifact, Error> {
        let engine = self.separation_engine().await?;
        let _serial = self.separation_gate.lock().await;
        engine.separate(req).await
    }

    /// Loaded flags per family. Reading never triggers a load.
    pub fn loaded(&self) -> serde_json::Value {
        serde_json::json!({
            "tts": self.tts.initialized(),
            "stt": self.stt.initialized(),
            "sfx": self.sfx.initialized(),
            "separation": self.separation.initialized(),
        })
    }

    /// Loads every engine, collecting per-family outcomes.
    pub async fn preload_all(&self) -> serde_json::Value {
        let mut statuses = serde_json::Map::new();
        statuses.insert("tts".to_string(), Self::outcome(self.tts_engine().await));
        statuses.insert("stt".to_string(), Self::outcome(self.stt_engine().await));
        statuses.insert("sfx".to_string(), Self::outcome(self.sfx_engine().await));
        statuses.insert(
            "separation".to_string(),
            Self::outcome(self.separation_engine().await),
        );
        serde_json::Value::Object(statuses)
    }

    fn outcome<T>(result: Result<T, Error>) -> serde_json::Value {
        match result {
            Ok(_) => serde_json::Value::String("loaded".to_string()),
            Err(e) => serde_json::Value::String(format!("error: {e}")),
        }
    }

    pub fn gpu_info(&self) -> serde_json::Value {
        self.factory.gpu_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{StubEngineFactory, StubTtsEngine};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts factory calls; optionally fails the first N tts loads.
    struct CountingFactory {
        tts_loads: AtomicUsize,
        fail_first: usize,
    }

    impl CountingFactory {
        fn new(fail_first: usize) -> Self {
            Self {
                tts_loads: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl EngineFactory for CountingFactory {
        async fn load_tts(&self) -> Result<Arc<dyn TtsEngine>, Error> {
            let n = self.tts_loads.fetch_add(1, Ordering::SeqCst);
            // Hold the load long enough for racers to pile up on the cell.
            tokio::time::sleep(Duration::from_millis(50)).await;
            if n < self.fail_first {
                return Err(Error::Transient("weights download failed".to_string()));
            }
            Ok(Arc::new(StubTtsEngine))
        }

        async fn load_stt(&self) -> Result<Arc<dyn SttEngine>, Error> {
            StubEngineFactory.load_stt().await
        }

        async fn load_sfx(&self) -> Result<Arc<dyn SfxEngine>, Error> {
            StubEngineFactory.load_sfx().await
        }

        async fn load_separation(&self) -> Result<Arc<dyn SeparationEngine>, Error> {
            StubEngineFactory.load_separation().await
        }

        fn gpu_info(&self) -> serde_json::Value {
            StubEngineFactory.gpu_info()
        }
    }

    fn tts_request() -> SynthesizeRequest {
        SynthesizeRequest {
            text: "one".to_string(),
            language: "en".to_string(),
            speaker_wav_url: None,
            speed: 1.0,
            output_format: "wav".to_string(),
        }
    }

    #[tokio::test]
    async fn concurrent_first_requests_load_once() {
        let factory = Arc::new(CountingFactory::new(0));
        let manager = Arc::new(ModelManager::new(factory.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.synthesize(&tts_request()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(factory.tts_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_unavailable_then_retried() {
        let factory = Arc::new(CountingFactory::new(1));
        let manager = ModelManager::new(factory.clone());

        let err = manager.synthesize(&tts_request()).await.unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable(_)));
        assert_eq!(manager.loaded()["tts"], false);

        // The cell stayed empty, so the next request tries again.
        assert!(manager.synthesize(&tts_request()).await.is_ok());
        assert_eq!(factory.tts_loads.load(Ordering::SeqCst), 2);
        assert_eq!(manager.loaded()["tts"], true);
    }

    #[tokio::test]
    async fn loaded_flags_never_trigger_a_load() {
        let factory = Arc::new(CountingFactory::new(0));
        let manager = ModelManager::new(factory.clone());

        let flags = manager.loaded();
        assert_eq!(flags["tts"], false);
        assert_eq!(flags["separation"], false);
        assert_eq!(factory.tts_loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preload_reports_per_family_outcomes() {
        let factory = Arc::new(CountingFactory::new(1));
        let manager = ModelManager::new(factory);

        let statuses = manager.preload_all().await;
        assert!(statuses["tts"].as_str().unwrap().starts_with("error:"));
        assert_eq!(statuses["stt"], "loaded");
        assert_eq!(statuses["sfx"], "loaded");
        assert_eq!(statuses["separation"], "loaded");
    }
}
