//! Error types for locator system

use action_primitives::ActionError;
use thiserror::Error;

use crate::types::{Attempt, AttemptReason};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("selector set must contain at least one selector")]
    EmptySelectorSet,
}

/// Every candidate was tried without success, or resolution was cancelled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorFailure {
    #[error("no selector resolved: {}", summarize(.attempts))]
    Exhausted { attempts: Vec<Attempt> },

    #[error("resolution cancelled after {} attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<Attempt> },
}

impl LocatorFailure {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            LocatorFailure::Exhausted { attempts } | LocatorFailure::Cancelled { attempts } => {
                attempts
            }
        }
    }

    /// Selectors tried, in the order they were supplied.
    pub fn selectors(&self) -> Vec<String> {
        self.attempts().iter().map(|a| a.selector.clone()).collect()
    }

    /// Project onto the host error taxonomy.
    ///
    /// Any actionability miss wins over not-found; a failure made only of
    /// host errors surfaces the last one.
    pub fn into_action_error(self) -> ActionError {
        let message = self.to_string();
        let attempts = match self {
            LocatorFailure::Cancelled { .. } => return ActionError::Cancelled(message),
            LocatorFailure::Exhausted { attempts } => attempts,
        };

        if attempts
            .iter()
            .any(|a| a.reason == AttemptReason::NotActionable)
        {
            return ActionError::ElementNotActionable(message);
        }

        let all_host = !attempts.is_empty()
            && attempts
                .iter()
                .all(|a| matches!(a.reason, AttemptReason::HostError(_)));
        if all_host {
            if let Some(AttemptReason::HostError(err)) = attempts.into_iter().last().map(|a| a.reason)
            {
                return err;
            }
        }
        ActionError::ElementNotFound(message)
    }
}

fn summarize(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("`{}` ({})", a.selector, a.reason.label()))
        .collect::<Vec<_>>()
        .join(", ")
}
