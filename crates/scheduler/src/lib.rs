//! SoulFlow execution service
//!
//! Tracks every submitted execution by id, runs each on its own task under a
//! shared concurrency limit and exposes status snapshots and cancellation.

pub mod api;
pub mod error;
pub mod metrics;
pub mod model;
pub mod runtime;

pub use api::{Dispatcher, ExecutionService};
pub use error::SchedulerError;
pub use model::{EngineConfig, ServiceLoad};
