//! Shared orchestrator state

use std::sync::Arc;

use voxrelay_client::{RemoteWorkerClient, Telemetry};
use voxrelay_core::RateLimiter;

use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub worker: Arc<RemoteWorkerClient>,
    pub ledger: Arc<dyn Ledger>,
    pub telemetry: Arc<Telemetry>,
}

impl AppState {
    pub fn new(
        limiter: RateLimiter,
        worker: RemoteWorkerClient,
        ledger: Arc<dyn Ledger>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            limiter: Arc::new(limiter),
            worker: Arc::new(worker),
            ledger,
            telemetry: Arc::new(telemetry),
        }
    }
}
