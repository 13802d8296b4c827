//! Interchangeable [`action_primitives::Host`] adapters

pub mod fixture;
pub mod remote;

pub use fixture::{FixtureHost, SimulatedRequest, Surface};
pub use remote::RemoteHost;
