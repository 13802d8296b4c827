//! SoulFlow locator & self-heal
//!
//! - ranked selector generation from an element descriptor
//! - resolution across a selector set with a per-candidate time split
//! - widening a set with generated candidates after repeated misses

pub mod errors;
pub mod healer;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use healer::*;
pub use strategies::*;
pub use types::*;
