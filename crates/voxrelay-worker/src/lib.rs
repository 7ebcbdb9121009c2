//! VoxRelay inference worker gateway
//!
//! An axum service that fronts the model runtimes: lazy single-flight
//! loading, per-family inference serialization, and a deterministic stub
//! backend for environments without a device.

pub mod api;
pub mod audio;
pub mod engines;
pub mod error;
pub mod models;
pub mod state;

pub use api::create_router;
pub use engines::{EngineFactory, StubEngineFactory};
pub use models::ModelManager;
pub use state::WorkerState;
