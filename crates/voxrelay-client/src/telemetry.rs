//! Usage telemetry pushed to a Redis stream
//!
//! Fire-and-forget: recording must never slow down or fail a dispatch, so
//! writes happen on a spawned task and a missing Redis just downgrades to
//! a debug log.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};
use voxrelay_core::OperationClass;

const DEFAULT_STREAM_KEY: &str = "voxrelay:usage";

pub struct Telemetry {
    manager: Option<redis::aio::ConnectionManager>,
    stream_key: String,
}

impl Telemetry {
    /// Returns a truncated hash suffix of the identifier for safe logging.
    fn key_id(identifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        let hex_hash = hex::encode(hasher.finalize());
        format!("...{}", &hex_hash[hex_hash.len() - 8..])
    }

    /// Connection failures are tolerated: telemetry downgrades to logging.
    pub async fn new(redis_url: Option<&str>) -> Self {
        let manager = match redis_url {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match redis::aio::ConnectionManager::new(client).await {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!("Failed to create Redis connection manager for telemetry: {e}");
                        None
                    }
                },
                Err(e) => {
                    warn!("Invalid Redis URL for telemetry: {e}");
                    None
                }
            },
            None => None,
        };

        Self {
            manager,
            stream_key: DEFAULT_STREAM_KEY.to_string(),
        }
    }

    pub fn with_stream_key(mut self, stream_key: &str) -> Self {
        if !stream_key.trim().is_empty() {
            self.stream_key = stream_key.to_string();
        }
        self
    }

    /// Records one dispatched operation: hashed caller id, operation
    /// class, payload size, and wall time.
    pub fn record(
        &self,
        identifier: &str,
        operation: OperationClass,
        payload_bytes: usize,
        response_time_ms: u64,
    ) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let key_id = Self::key_id(identifier);

        if let Some(ref manager) = self.manager {
            let stream_key = self.stream_key.clone();
            let mut manager = manager.clone();

            tokio::spawn(async move {
                let result: Result<(), redis::RedisError> = redis::cmd("XADD")
                    .arg(&stream_key)
                    .arg("*")
                    .arg("key")
                    .arg(&key_id)
                    .arg("operation")
                    .arg(operation.as_str())
                    .arg("payload_bytes")
                    .arg(payload_bytes.to_string())
                    .arg("response_time_ms")
                    .arg(response_time_ms.to_string())
                    .arg("timestamp")
                    .arg(timestamp.to_string())
                    .query_async(&mut manager)
                    .await;

                if let Err(e) = result {
                    error!("Failed to push usage record to Redis stream: {e:?}");
                }
            });
        } else {
            debug!(
                "Usage record skipped (Redis unavailable): key_id={key_id}, operation={}, \
                 payload_bytes={payload_bytes}, response_time_ms={response_time_ms}",
                operation.as_str()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_is_a_short_suffix() {
        let id = Telemetry::key_id("user-42");
        assert!(id.starts_with("..."));
        assert_eq!(id.len(), 11);
        // Deterministic for the same input, distinct for different inputs.
        assert_eq!(id, Telemetry::key_id("user-42"));
        assert_ne!(id, Telemetry::key_id("user-43"));
    }

    #[tokio::test]
    async fn recording_without_redis_does_not_panic() {
        let telemetry = Telemetry::new(None).await;
        telemetry.record("user-42", OperationClass::Tts, 1024, 250);
    }
}
