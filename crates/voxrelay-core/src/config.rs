//! Worker dispatch configuration
//!
//! Read once from the environment at startup; changing it requires a
//! restart.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKER_URL: &str = "http://localhost:8001";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Configuration for the remote inference worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// True when `GPU_WORKER_MODE=remote`. Remote dispatch is refused
    /// outright when false.
    pub enabled: bool,
    pub base_url: String,
    /// Whole-request budget. Inference is slow, hence the 5 minute default.
    pub timeout_secs: u64,
    /// Hard ceiling on attempts for transient failures.
    pub retry_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: DEFAULT_WORKER_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl WorkerConfig {
    /// Reads `GPU_WORKER_MODE`, `GPU_WORKER_URL`, `GPU_WORKER_TIMEOUT` and
    /// `GPU_WORKER_RETRY`. Unparseable numbers fall back to defaults.
    pub fn from_env() -> Self {
        let mode = std::env::var("GPU_WORKER_MODE").unwrap_or_else(|_| "local".to_string());
        let base_url =
            std::env::var("GPU_WORKER_URL").unwrap_or_else(|_| DEFAULT_WORKER_URL.to_string());
        let timeout_secs = std::env::var("GPU_WORKER_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retry_attempts = std::env::var("GPU_WORKER_RETRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS);

        Self {
            enabled: mode == "remote",
            base_url,
            timeout_secs,
            retry_attempts,
        }
    }

    pub fn remote(base_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
