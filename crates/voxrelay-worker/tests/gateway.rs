use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use voxrelay_worker::audio;
use voxrelay_worker::{create_router, StubEngineFactory, WorkerState};

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

fn app() -> (Router, WorkerState) {
    let state = WorkerState::new(Arc::new(StubEngineFactory));
    (create_router(state.clone()), state)
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// name, optional filename, payload
fn multipart_body(parts: &[(&str, Option<&str>, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, Vec<u8>)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn sample_wav(len: usize) -> Vec<u8> {
    let samples: Vec<i16> = (0..len).map(|i| (i as i16).wrapping_mul(7)).collect();
    audio::encode_wav(&samples, audio::STUB_SAMPLE_RATE)
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn empty_text_is_rejected_without_loading_a_model() {
    let (app, state) = app();
    let response = app
        .oneshot(json_request("/tts/generate", serde_json::json!({ "text": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.manager.loaded()["tts"], false);
}

#[tokio::test]
async fn oversized_text_is_rejected() {
    let (app, _) = app();
    let text = "a".repeat(5001);
    let response = app
        .oneshot(json_request("/tts/generate", serde_json::json!({ "text": text })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tts_produces_identical_audio_for_identical_input() {
    let (app, state) = app();
    let req = serde_json::json!({ "text": "hello from the gateway" });

    let first = app
        .clone()
        .oneshot(json_request("/tts/generate", req.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/wav"
    );
    assert!(first.headers().contains_key("X-Sample-Rate"));
    assert!(first
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("speech.wav"));
    let first_body = body_bytes(first).await;

    let second = app.oneshot(json_request("/tts/generate", req)).await.unwrap();
    let second_body = body_bytes(second).await;
    assert_eq!(first_body, second_body);

    // The decoded payload is a valid WAV.
    assert!(audio::decode_wav(&first_body).is_ok());
    assert_eq!(state.manager.loaded()["tts"], true);
}

#[tokio::test]
async fn sfx_bounds_are_enforced_before_inference() {
    let (app, state) = app();

    for bad in [
        serde_json::json!({ "prompt": "thunder", "duration": 0.5 }),
        serde_json::json!({ "prompt": "thunder", "duration": 31.0 }),
        serde_json::json!({ "prompt": "thunder", "num_inference_steps": 5 }),
        serde_json::json!({ "prompt": "thunder", "num_inference_steps": 500 }),
        serde_json::json!({ "prompt": "" }),
        serde_json::json!({ "prompt": "p".repeat(501) }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("/sfx/generate", bad))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(state.manager.loaded()["sfx"], false);

    let response = app
        .oneshot(json_request(
            "/sfx/generate",
            serde_json::json!({ "prompt": "rolling thunder" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn transcription_returns_structured_json() {
    let (app, _) = app();
    let wav = sample_wav(audio::STUB_SAMPLE_RATE as usize);

    let response = app
        .oneshot(multipart_request(
            "/stt/transcribe",
            &[
                ("audio", Some("clip.wav"), wav),
                ("task", None, b"transcribe".to_vec()),
                ("language", None, b"en".to_vec()),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["language"], "en");
    assert!((body["duration"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert!(!body["segments"].as_array().unwrap().is_empty());
    assert!(!body["words"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn transcription_requires_audio_and_a_known_task() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/stt/transcribe",
            &[("task", None, b"transcribe".to_vec())],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(multipart_request(
            "/stt/transcribe",
            &[
                ("audio", Some("clip.wav"), sample_wav(64)),
                ("task", None, b"summarize".to_vec()),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn separation_returns_a_stem_for_a_valid_mix() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(multipart_request(
            "/isolation/separate",
            &[
                ("audio", Some("mix.wav"), sample_wav(256)),
                ("stems", None, b"vocals".to_vec()),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert!(audio::decode_wav(&body).is_ok());

    // Garbage audio is the caller's fault.
    let response = app
        .oneshot(multipart_request(
            "/isolation/separate",
            &[("audio", Some("mix.wav"), b"not riff".to_vec())],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voice_clone_combines_references_and_replays_by_idempotency_key() {
    let (app, _) = app();

    let parts = vec![
        ("audio_files", Some("a.wav"), sample_wav(100)),
        ("audio_files", Some("b.wav"), sample_wav(50)),
        ("voice_name", None, b"narrator".to_vec()),
    ];

    let mut request = multipart_request("/voice/clone", &parts);
    request
        .headers_mut()
        .insert("X-Idempotency-Key", "key-123".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("X-Voice-Name").unwrap(), "narrator");
    let first_body = body_bytes(response).await;

    let (samples, _) = audio::decode_wav(&first_body).unwrap();
    assert_eq!(samples.len(), 150, "clips concatenate in order");

    // Replaying the key returns the stored result.
    let mut request = multipart_request("/voice/clone", &parts);
    request
        .headers_mut()
        .insert("X-Idempotency-Key", "key-123".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, first_body);
}

#[tokio::test]
async fn voice_clone_requires_a_name_and_references() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/voice/clone",
            &[("audio_files", Some("a.wav"), sample_wav(10))],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(multipart_request(
            "/voice/clone",
            &[("voice_name", None, b"narrator".to_vec())],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_loaded_flags_without_triggering_loads() {
    let (app, state) = app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models_loaded"]["tts"], false);
    assert_eq!(body["models_loaded"]["stt"], false);
    assert_eq!(state.manager.loaded()["tts"], false);
}

#[tokio::test]
async fn preload_kicks_off_in_the_background() {
    let (app, state) = app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/models/preload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "preloading");

    // Stub engines load instantly; give the spawned task a beat.
    for _ in 0..50 {
        if state.manager.loaded()["tts"] == true {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state.manager.loaded()["tts"], true);
    assert_eq!(state.manager.loaded()["separation"], true);
}

#[tokio::test]
async fn gpu_info_describes_the_backend() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::builder().uri("/gpu/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["available"], false);
    assert_eq!(body["device"], "cpu");
}
