//! Error types for host interactions and waits

use thiserror::Error;

/// Typed failures raised at the host boundary.
///
/// Every host adapter maps its native failures onto one of these variants so
/// that classification downstream is an exhaustive match, never string
/// inspection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No element matched the selector
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Element exists but is hidden, disabled or otherwise not interactable
    #[error("Element not actionable: {0}")]
    ElementNotActionable(String),

    /// A wait or host call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport or network failure talking to the host
    #[error("Network error: {0}")]
    Network(String),

    /// Cooperative cancellation observed
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Step parameters are missing or malformed
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Any other host-side failure
    #[error("Host error: {0}")]
    Host(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ActionError::Cancelled(_) | ActionError::InvalidParameters(_)
        )
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::ElementNotFound(_) => "element_not_found",
            ActionError::ElementNotActionable(_) => "element_not_actionable",
            ActionError::Timeout(_) => "timeout",
            ActionError::Network(_) => "network",
            ActionError::Cancelled(_) => "cancelled",
            ActionError::InvalidParameters(_) => "invalid_parameters",
            ActionError::Host(_) => "host",
        }
    }

    /// Human-readable detail without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            ActionError::ElementNotFound(msg)
            | ActionError::ElementNotActionable(msg)
            | ActionError::Timeout(msg)
            | ActionError::Network(msg)
            | ActionError::Cancelled(msg)
            | ActionError::InvalidParameters(msg)
            | ActionError::Host(msg) => msg,
        }
    }
}
