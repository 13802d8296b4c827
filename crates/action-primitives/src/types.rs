//! Core data types for host interactions

use std::time::Duration;

use serde::{Deserialize, Serialize};
use soulflow_core_types::{ElementState, SessionId};
use tokio_util::sync::CancellationToken;

use crate::errors::ActionError;

/// Execution context threaded through every wait and host call.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Target session
    pub session: SessionId,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for tracing and correlation
    pub action_id: String,
}

impl ExecCtx {
    pub fn new(session: SessionId, cancel_token: CancellationToken) -> Self {
        Self {
            session,
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Fail fast with [`ActionError::Cancelled`] when the token has fired.
    pub fn ensure_active(&self) -> Result<(), ActionError> {
        if self.is_cancelled() {
            Err(ActionError::Cancelled("context cancelled".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Interaction performed on a resolved element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Type,
    Extract,
    Custom(String),
}

impl Interaction {
    pub fn name(&self) -> &str {
        match self {
            Interaction::Click => "click",
            Interaction::Type => "type",
            Interaction::Extract => "extract",
            Interaction::Custom(name) => name,
        }
    }
}

/// Auto-wait tuning shared by every wait the engine performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    /// Budget for navigation to report ready twice in a row
    pub settle_timeout_ms: u64,
    /// Trailing quiet window for network idle
    pub idle_window_ms: u64,
    /// Budget for an idle wait used as a retry pre-condition
    pub idle_timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 30_000,
            settle_timeout_ms: 10_000,
            idle_window_ms: 500,
            idle_timeout_ms: 10_000,
        }
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Per-call wait overrides; unset fields fall back to [`WaitConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            poll_interval: None,
        }
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// A failed element wait together with the last state observed.
///
/// `last_seen` lets callers distinguish an element that never appeared from
/// one that was present but never reached the requested state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitFailure {
    pub error: ActionError,
    pub last_seen: Option<ElementState>,
}

impl WaitFailure {
    pub fn new(error: ActionError, last_seen: Option<ElementState>) -> Self {
        Self { error, last_seen }
    }

    pub fn found_but_not_actionable(&self) -> bool {
        self.last_seen.is_some_and(|state| state.exists)
    }
}

impl From<WaitFailure> for ActionError {
    fn from(failure: WaitFailure) -> Self {
        failure.error
    }
}
