//! Failure classification at the host boundary

use std::fmt;

use action_primitives::ActionError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ElementNotFound,
    ElementNotActionable,
    Timeout,
    NetworkError,
    CancellationRequested,
    Generic,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ElementNotFound => "element_not_found",
            FailureCategory::ElementNotActionable => "element_not_actionable",
            FailureCategory::Timeout => "timeout",
            FailureCategory::NetworkError => "network_error",
            FailureCategory::CancellationRequested => "cancellation_requested",
            FailureCategory::Generic => "generic",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a typed host error onto its failure category.
pub fn classify(error: &ActionError) -> FailureCategory {
    match error {
        ActionError::ElementNotFound(_) => FailureCategory::ElementNotFound,
        ActionError::ElementNotActionable(_) => FailureCategory::ElementNotActionable,
        ActionError::Timeout(_) => FailureCategory::Timeout,
        ActionError::Network(_) => FailureCategory::NetworkError,
        ActionError::Cancelled(_) => FailureCategory::CancellationRequested,
        ActionError::InvalidParameters(_) | ActionError::Host(_) => FailureCategory::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_category() {
        let cases = [
            (ActionError::ElementNotFound("a".into()), FailureCategory::ElementNotFound),
            (
                ActionError::ElementNotActionable("a".into()),
                FailureCategory::ElementNotActionable,
            ),
            (ActionError::Timeout("a".into()), FailureCategory::Timeout),
            (ActionError::Network("a".into()), FailureCategory::NetworkError),
            (
                ActionError::Cancelled("a".into()),
                FailureCategory::CancellationRequested,
            ),
            (ActionError::InvalidParameters("a".into()), FailureCategory::Generic),
            (ActionError::Host("a".into()), FailureCategory::Generic),
        ];
        for (error, expected) in cases {
            assert_eq!(classify(&error), expected, "{error}");
        }
    }

    #[test]
    fn categories_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureCategory::ElementNotActionable).unwrap(),
            "\"element_not_actionable\""
        );
    }
}
