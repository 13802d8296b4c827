//! SoulFlow action primitives
//!
//! The host contract the engine drives, the typed error taxonomy every host
//! adapter maps onto, and the polling auto-wait engine:
//! - element waits for attached / visible / enabled
//! - navigation settle and network idle waits
//! - an in-memory scripted host for dry runs and tests

pub mod errors;
pub mod host;
pub mod memory;
pub mod types;
mod waiting;

pub use errors::*;
pub use host::Host;
pub use types::*;
pub use waiting::*;
