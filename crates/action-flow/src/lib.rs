//! Flow Orchestration Layer
//!
//! Runs a workflow's steps in order against one session, classifying each
//! failure and deciding whether and how the step is retried.

pub mod classifier;
pub mod errors;
pub mod executor;
pub mod policy;
pub mod types;
pub mod variables;

pub use classifier::{classify, FailureCategory};
pub use errors::FlowError;
pub use executor::{DefaultFlowExecutor, FlowExecutor};
pub use policy::{decide, Adjustments, RetryDecision, RetryPolicy};
pub use types::*;
pub use variables::{lookup, merge_bindings, resolve, Resolution, VariableBag};
