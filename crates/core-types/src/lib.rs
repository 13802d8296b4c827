use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one execution tracked by the engine registry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to the target session a workflow runs against.
///
/// The engine never interprets the value; host adapters map it onto a tab,
/// a remote job or a fixture surface.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Observed state of the element a selector points at.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub exists: bool,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementState {
    pub const MISSING: ElementState = ElementState {
        exists: false,
        visible: false,
        enabled: false,
    };

    pub const READY: ElementState = ElementState {
        exists: true,
        visible: true,
        enabled: true,
    };

    /// Whether this observation satisfies the requested wait state.
    pub fn satisfies(&self, state: WaitState) -> bool {
        match state {
            WaitState::Attached => self.exists,
            WaitState::Visible => self.exists && self.visible,
            WaitState::Enabled => self.exists && self.visible && self.enabled,
        }
    }
}

/// Element condition an auto-wait resolves on.
///
/// `Enabled` implies `Visible`, which implies `Attached`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Attached,
    #[default]
    Visible,
    Enabled,
}

impl WaitState {
    pub fn name(&self) -> &'static str {
        match self {
            WaitState::Attached => "attached",
            WaitState::Visible => "visible",
            WaitState::Enabled => "enabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "attached" => Some(WaitState::Attached),
            "visible" => Some(WaitState::Visible),
            "enabled" => Some(WaitState::Enabled),
            _ => None,
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
