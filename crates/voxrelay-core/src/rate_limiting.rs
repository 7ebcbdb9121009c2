//! Rate limiting utilities for VoxRelay
//!
//! Provides distributed throughput enforcement using Redis and a
//! sliding-window counter over a sorted set.

use redis::aio::ConnectionManager;
use redis::Client;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::types::OperationClass;

const KEY_PREFIX: &str = "voxrelay:ratelimit";

// Evict-count-record-expire as one atomic unit. Two concurrent checks for
// the same key must never both be admitted when one slot remains, so the
// whole sequence runs server-side as a single script invocation.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
if count < limit then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, window + 1)
    return {1, limit - count - 1}
end
redis.call('EXPIRE', key, window + 1)
return {0, 0}
"#;

const USAGE_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
return redis.call('ZCARD', key)
"#;

/// The outcome of one admission check. Ephemeral: produced per request,
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the oldest recorded entry will have aged out.
    pub reset_at: u64,
    pub window_secs: u64,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self) -> u64 {
        let now = epoch_secs();
        self.reset_at.saturating_sub(now).max(1).min(self.window_secs)
    }
}

/// Sliding-window rate limiter backed by Redis.
///
/// Shared by every orchestrator replica; correctness under concurrency
/// comes from the store-side script, not client locking. When constructed
/// without a Redis URL, or when Redis becomes unreachable, the limiter
/// fails open: product availability outweighs strict enforcement, and the
/// degraded path is logged so it is never silent.
pub struct RateLimiter {
    manager: Option<ConnectionManager>,
}

impl RateLimiter {
    pub async fn connect(redis_url: Option<&str>) -> Result<Self, crate::Error> {
        let manager = match redis_url {
            Some(url) => {
                let client = Client::open(url)?;
                Some(ConnectionManager::new(client).await?)
            }
            None => {
                warn!("rate limiter running without Redis; every request will be admitted");
                None
            }
        };
        Ok(Self { manager })
    }

    /// A limiter that admits everything. For tests and single-process dev.
    pub fn disabled() -> Self {
        Self { manager: None }
    }

    fn storage_key(identifier: &str, class: OperationClass) -> String {
        format!("{KEY_PREFIX}:{identifier}:{}", class.as_str())
    }

    /// Atomically evicts expired entries, counts the window, and records
    /// this request if a slot is free.
    pub async fn check_and_record(
        &self,
        identifier: &str,
        class: OperationClass,
        limit: u32,
        window_secs: u64,
    ) -> RateLimitDecision {
        let now = epoch_secs();
        let open = |remaining| RateLimitDecision {
            allowed: true,
            limit,
            remaining,
            reset_at: now + window_secs,
            window_secs,
        };

        let Some(ref manager) = self.manager else {
            return open(limit.saturating_sub(1));
        };
        let mut conn = manager.clone();

        // Member must be unique per request: two admits in the same second
        // would otherwise collapse into one sorted-set entry.
        let member = format!("{now}-{}", uuid::Uuid::new_v4());

        let result: Result<Vec<u64>, redis::RedisError> = redis::cmd("EVAL")
            .arg(SLIDING_WINDOW_SCRIPT)
            .arg(1)
            .arg(Self::storage_key(identifier, class))
            .arg(now)
            .arg(window_secs)
            .arg(limit)
            .arg(&member)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(reply) => {
                let allowed = reply.first().copied().unwrap_or(0) == 1;
                let remaining = reply.get(1).copied().unwrap_or(0) as u32;
                RateLimitDecision {
                    allowed,
                    limit,
                    remaining,
                    reset_at: now + window_secs,
                    window_secs,
                }
            }
            Err(e) => {
                warn!(
                    identifier,
                    class = class.as_str(),
                    "rate limit store unreachable, failing open: {e}"
                );
                open(limit.saturating_sub(1))
            }
        }
    }

    /// Live count of requests recorded in the current window, without
    /// consuming a slot.
    pub async fn current_usage(
        &self,
        identifier: &str,
        class: OperationClass,
        window_secs: u64,
    ) -> Result<u64, crate::Error> {
        let Some(ref manager) = self.manager else {
            return Ok(0);
        };
        let mut conn = manager.clone();

        let count: u64 = redis::cmd("EVAL")
            .arg(USAGE_SCRIPT)
            .arg(1)
            .arg(Self::storage_key(identifier, class))
            .arg(epoch_secs())
            .arg(window_secs)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
