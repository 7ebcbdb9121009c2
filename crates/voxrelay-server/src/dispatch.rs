//! Caller resolution, rate-limit admission, and dispatch

use std::net::SocketAddr;

use axum::http::HeaderMap;
use voxrelay_core::{
    AudioArtifact, Error, InferenceRequest, InferenceResult, OperationClass, PlanTier,
    RateLimitDecision,
};

use crate::ledger::hash_api_key;
use crate::state::AppState;

/// A resolved caller: a stable identifier to rate-limit on plus the plan
/// that prices its limits.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identifier: String,
    pub plan: PlanTier,
}

/// API key first, then the forwarded client address when a proxy set
/// one, then the peer address of the direct connection. `anonymous` is
/// the last resort when no peer is known. Unknown keys are not rejected;
/// they ride the free tier keyed by their own hash so one bad key cannot
/// exhaust another caller's window.
pub async fn resolve_caller(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<Caller, Error> {
    if let Some(key) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        let key_hash = hash_api_key(key);
        if let Some(account) = state.ledger.resolve_api_key(&key_hash).await? {
            return Ok(Caller {
                identifier: account.user_id,
                plan: account.plan,
            });
        }
        return Ok(Caller {
            identifier: format!("key:{key_hash}"),
            plan: PlanTier::Free,
        });
    }

    let identifier = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .or_else(|| peer.map(|addr| format!("ip:{}", addr.ip())))
        .unwrap_or_else(|| "anonymous".to_string());
    Ok(Caller {
        identifier,
        plan: PlanTier::Free,
    })
}

/// Looks up the caller's {limit, window} for the operation class and
/// records one unit of usage. Denial is an error so handlers cannot
/// forget to stop.
pub async fn admit(
    state: &AppState,
    caller: &Caller,
    class: OperationClass,
) -> Result<RateLimitDecision, Error> {
    let limit = caller.plan.rate_limit(class);
    let decision = state
        .limiter
        .check_and_record(&caller.identifier, class, limit.limit, limit.window_secs)
        .await;
    if !decision.allowed {
        return Err(Error::RateLimited {
            limit: decision.limit,
            window_secs: decision.window_secs,
            reset_at: decision.reset_at,
            retry_after_secs: decision.retry_after_secs(),
        });
    }
    Ok(decision)
}

/// Forwards an admitted request to the remote worker.
pub async fn dispatch(state: &AppState, request: &InferenceRequest) -> Result<InferenceResult, Error> {
    match request {
        InferenceRequest::Synthesize(req) => {
            let data = state.worker.synthesize(req).await?;
            Ok(InferenceResult::Audio(wav_artifact(data)))
        }
        InferenceRequest::Transcribe(req) => {
            let transcript = state.worker.transcribe(req).await?;
            Ok(InferenceResult::Transcript(transcript))
        }
        InferenceRequest::GenerateSfx(req) => {
            let data = state.worker.generate_sfx(req).await?;
            Ok(InferenceResult::Audio(wav_artifact(data)))
        }
        InferenceRequest::Isolate(req) => {
            let data = state.worker.isolate(req).await?;
            Ok(InferenceResult::Audio(wav_artifact(data)))
        }
        InferenceRequest::CloneVoice(req) => {
            let cloned = state.worker.clone_voice(req).await?;
            Ok(InferenceResult::Audio(wav_artifact(cloned.data)))
        }
    }
}

fn wav_artifact(data: bytes::Bytes) -> AudioArtifact {
    AudioArtifact {
        data,
        media_type: "audio/wav".to_string(),
        duration_secs: None,
        sample_rate: None,
    }
}
