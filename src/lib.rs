//! SoulFlow
//!
//! Configuration, logging, host adapters and engine wiring shared by the
//! `soulflow` binary and the integration tests.

pub mod config;
pub mod engine;
pub mod errors;
pub mod hosts;
pub mod loader;
pub mod metrics;

pub use config::{Config, LoadedConfig};
pub use engine::Engine;
pub use errors::SoulFlowError;
