//! Account lookup seam
//!
//! Billing lives in another service; the orchestrator only needs to turn
//! a hashed API key into {user, plan}. The static in-memory impl serves
//! dev deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;
use voxrelay_core::{Error, PlanTier};

#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: String,
    pub plan: PlanTier,
}

/// Raw API keys are never stored or logged; lookups key on the hash.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn resolve_api_key(&self, key_hash: &str) -> Result<Option<Account>, Error>;
}

#[derive(Default)]
pub struct StaticLedger {
    accounts: HashMap<String, Account>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, api_key: &str, account: Account) -> Self {
        self.accounts.insert(hash_api_key(api_key), account);
        self
    }

    /// Parses `VOXRELAY_API_KEYS` entries of the form `key:user_id:plan`,
    /// comma separated. Malformed entries are skipped with a warning.
    pub fn from_env() -> Self {
        let mut ledger = Self::new();
        let raw = match std::env::var("VOXRELAY_API_KEYS") {
            Ok(raw) => raw,
            Err(_) => return ledger,
        };
        for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
            let mut parts = entry.trim().splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(user_id), Some(plan)) if !key.is_empty() && !user_id.is_empty() => {
                    ledger = ledger.with_key(
                        key,
                        Account {
                            user_id: user_id.to_string(),
                            plan: PlanTier::from_name(plan),
                        },
                    );
                }
                _ => warn!("Skipping malformed VOXRELAY_API_KEYS entry"),
            }
        }
        ledger
    }
}

#[async_trait]
impl Ledger for StaticLedger {
    async fn resolve_api_key(&self, key_hash: &str) -> Result<Option<Account>, Error> {
        Ok(self.accounts.get(key_hash).cloned())
    }
}
