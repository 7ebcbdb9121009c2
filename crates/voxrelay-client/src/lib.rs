//! VoxRelay remote inference client
//!
//! A typed async HTTP client for the GPU worker gateway, with bounded
//! retries for transient failures, plus fire-and-forget usage telemetry.

pub mod telemetry;
pub mod worker_client;

pub use telemetry::Telemetry;
pub use worker_client::{ClonedVoice, RemoteWorkerClient, WorkerHealth};
