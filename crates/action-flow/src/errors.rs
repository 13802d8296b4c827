//! Flow error types

use action_locator::LocatorError;
use thiserror::Error;

use crate::types::ValidationIssue;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Workflow document could not be parsed
    #[error("Workflow parse failed: {0}")]
    Parse(String),

    /// Workflow failed validation
    #[error("Workflow validation failed: {}", render(.0))]
    ValidationFailed(Vec<ValidationIssue>),

    /// Selector list supplied by a step is unusable
    #[error("Invalid selectors: {0}")]
    Selectors(#[from] LocatorError),
}

fn render(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
