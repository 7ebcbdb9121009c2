//! Error handling for VoxRelay
//!
//! Defines the standard error taxonomy used throughout the system.

use thiserror::Error;

/// The main error type for VoxRelay.
///
/// Variants map one-to-one onto how a failure must be handled at the
/// dispatch boundary: `Validation` and `Config` are terminal, `Transient`
/// and `ResourceUnavailable` are retryable, `RateLimited` is an expected
/// admission outcome rather than an infrastructure fault.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("transient infrastructure failure: {0}")]
    Transient(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("rate limit exceeded: {limit} per {window_secs}s, retry after {retry_after_secs}s")]
    RateLimited {
        limit: u32,
        window_secs: u64,
        reset_at: u64,
        retry_after_secs: u64,
    },

    #[error("inference resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Redis error")]
    Redis(#[from] redis::RedisError),

    #[error("audio codec error: {0}")]
    Audio(String),
}

impl Error {
    /// Whether the remote client may retry the same payload.
    ///
    /// `ResourceUnavailable` counts as retryable: a later attempt may land
    /// on a healthy replica.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::ResourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_resource_errors_are_retryable() {
        assert!(Error::Transient("connection refused".into()).is_retryable());
        assert!(Error::ResourceUnavailable("tts engine failed to load".into()).is_retryable());
    }

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(!Error::Validation("text is empty".into()).is_retryable());
        assert!(!Error::Config("remote worker not enabled".into()).is_retryable());
        assert!(!Error::RateLimited {
            limit: 10,
            window_secs: 60,
            reset_at: 0,
            retry_after_secs: 60,
        }
        .is_retryable());
    }
}
