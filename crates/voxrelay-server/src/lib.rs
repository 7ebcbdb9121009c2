//! VoxRelay dispatch orchestrator
//!
//! The public API: resolves callers, admits them through the
//! sliding-window rate limiter, and forwards admitted work to the remote
//! inference worker.

pub mod api;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod state;

pub use api::create_router;
pub use ledger::{hash_api_key, Account, Ledger, StaticLedger};
pub use state::AppState;
