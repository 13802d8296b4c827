//! Workflow definitions and execution records

use std::fmt;
use std::sync::Arc;

use action_locator::ElementDescriptor;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use soulflow_core_types::{ExecutionId, SessionId};
use tracing::warn;

use crate::classifier::FailureCategory;
use crate::errors::FlowError;

/// What a step does. Unknown names are kept as `Custom` and dispatched to
/// the host as a named interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Wait,
    Screenshot,
    Extract,
    Custom(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Extract => "extract",
            ActionKind::Custom(name) => name,
        }
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" | "goto" => ActionKind::Navigate,
            "click" => ActionKind::Click,
            "type" | "fill" => ActionKind::Type,
            "wait" => ActionKind::Wait,
            "screenshot" | "capture" => ActionKind::Screenshot,
            "extract" => ActionKind::Extract,
            _ => ActionKind::Custom(value),
        }
    }
}

impl From<ActionKind> for String {
    fn from(value: ActionKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Bindings merged into the bag before this step's placeholders resolve
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Pre-recorded ranked selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Vec<String>>,
    /// Recorded element description used for widening
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<ElementDescriptor>,
}

impl Step {
    pub fn new(action: ActionKind) -> Self {
        Self {
            id: None,
            action,
            parameters: Map::new(),
            variables: Map::new(),
            timeout_ms: None,
            selectors: None,
            descriptor: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_variable(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = Some(selectors.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_descriptor(mut self, descriptor: ElementDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Label used in logs: explicit id, else the position.
    pub fn label(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("step_{}", index))
    }

    pub fn has_target(&self) -> bool {
        self.parameters
            .get("selector")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
            || self.selectors.as_ref().is_some_and(|s| !s.is_empty())
            || self.descriptor.is_some()
    }
}

/// A problem found by [`WorkflowDefinition::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub step: usize,
    pub action: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}): {}", self.step, self.action, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn from_json(input: &str) -> Result<Self, FlowError> {
        serde_json::from_str(input).map_err(|err| FlowError::Parse(err.to_string()))
    }

    /// Name used to reference the workflow from an execution record.
    pub fn reference(&self) -> Option<String> {
        self.id.clone().or_else(|| self.name.clone())
    }

    /// Report steps missing parameters their action requires.
    ///
    /// Execution does not require a clean report; an invalid step fails when
    /// it is reached.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            let mut missing = |message: &str| {
                issues.push(ValidationIssue {
                    step: index,
                    action: step.action.to_string(),
                    message: message.to_string(),
                })
            };
            let has_str = |key: &str| step.parameters.get(key).is_some_and(|v| !v.is_null());
            match &step.action {
                ActionKind::Navigate if !has_str("url") => missing("missing parameter `url`"),
                ActionKind::Click | ActionKind::Extract if !step.has_target() => {
                    missing("needs `parameters.selector`, `selectors` or `descriptor`")
                }
                ActionKind::Type => {
                    if !step.has_target() {
                        missing("needs `parameters.selector`, `selectors` or `descriptor`");
                    }
                    if !has_str("text") {
                        missing("missing parameter `text`");
                    }
                }
                ActionKind::Wait => {
                    if let Some(duration) = step.parameters.get("duration_ms") {
                        if !duration.is_u64() {
                            missing("`duration_ms` must be a non-negative integer");
                        }
                    }
                }
                _ => {}
            }
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Retrying)
                | (Retrying, Running)
                | (Retrying, Failed)
                | (Retrying, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Retrying => "retrying",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure kept on the record verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub category: FailureCategory,
    pub message: String,
    /// Selectors attempted by the failing step, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<String>,
}

impl StepError {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            selectors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub healed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepResult {
    fn pending(index: usize, step: &Step) -> Self {
        Self {
            index,
            id: step.id.clone(),
            action: step.action.to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            selector: None,
            healed: false,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    pub session: SessionId,
    pub status: ExecutionStatus,
    pub current_step: usize,
    /// Retries taken per step (attempts beyond the first)
    pub retry_counts: Vec<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<StepError>,
    /// One entry per completed step
    pub outputs: Vec<Value>,
    pub steps: Vec<StepResult>,
    pub progress: Progress,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ExecutionRecord {
    pub fn new(id: ExecutionId, workflow: &WorkflowDefinition, session: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow: workflow.reference(),
            session,
            status: ExecutionStatus::Queued,
            current_step: 0,
            retry_counts: vec![0; workflow.steps.len()],
            created_at: now,
            updated_at: now,
            last_error: None,
            outputs: Vec::new(),
            steps: workflow
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepResult::pending(index, step))
                .collect(),
            progress: Progress {
                total: workflow.steps.len(),
                ..Progress::default()
            },
            variables: workflow.variables.clone(),
        }
    }

    pub fn total_retries(&self) -> u32 {
        self.retry_counts.iter().sum()
    }
}

/// Shared, lock-protected view of one execution record.
///
/// Every mutation goes through here: once the record is terminal all further
/// updates are dropped, and status changes follow the allowed edges only.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    inner: Arc<RwLock<ExecutionRecord>>,
}

impl ExecutionHandle {
    pub fn new(record: ExecutionRecord) -> Self {
        Self {
            inner: Arc::new(RwLock::new(record)),
        }
    }

    pub fn snapshot(&self) -> ExecutionRecord {
        self.inner.read().clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.inner.read().status
    }

    pub fn id(&self) -> ExecutionId {
        self.inner.read().id.clone()
    }

    pub fn session(&self) -> SessionId {
        self.inner.read().session.clone()
    }

    /// Apply `f` unless the record is terminal. Returns whether it ran.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let mut record = self.inner.write();
        if record.status.is_terminal() {
            return false;
        }
        f(&mut record);
        record.updated_at = Utc::now();
        true
    }

    /// Move to `next` if the edge is allowed.
    pub fn transition(&self, next: ExecutionStatus) -> bool {
        let mut record = self.inner.write();
        Self::transition_locked(&mut record, next)
    }

    fn transition_locked(record: &mut ExecutionRecord, next: ExecutionStatus) -> bool {
        if !record.status.can_transition_to(next) {
            if !record.status.is_terminal() {
                warn!(
                    execution_id = %record.id,
                    from = %record.status,
                    to = %next,
                    "refusing illegal status transition"
                );
            }
            return false;
        }
        record.status = next;
        record.updated_at = Utc::now();
        true
    }

    pub fn begin_step(&self, index: usize) {
        self.update(|record| {
            record.current_step = index;
            if let Some(step) = record.steps.get_mut(index) {
                step.status = StepStatus::Running;
                step.attempts = 1;
                step.started_at = Some(Utc::now());
            }
        });
    }

    /// Count a retry for `index` and enter `Retrying`.
    pub fn record_retry(&self, index: usize, error: &StepError) -> bool {
        let mut record = self.inner.write();
        if !Self::transition_locked(&mut record, ExecutionStatus::Retrying) {
            return false;
        }
        if let Some(count) = record.retry_counts.get_mut(index) {
            *count += 1;
        }
        if let Some(step) = record.steps.get_mut(index) {
            step.status = StepStatus::Retrying;
            step.error = Some(error.clone());
        }
        true
    }

    /// Leave `Retrying` for the next attempt of `index`.
    pub fn resume_step(&self, index: usize, attempt: u32) -> bool {
        let mut record = self.inner.write();
        if !Self::transition_locked(&mut record, ExecutionStatus::Running) {
            return false;
        }
        if let Some(step) = record.steps.get_mut(index) {
            step.status = StepStatus::Running;
            step.attempts = attempt;
        }
        true
    }

    pub fn complete_step(
        &self,
        index: usize,
        output: Value,
        selector: Option<String>,
        healed: bool,
        variables: &Map<String, Value>,
    ) {
        self.update(|record| {
            if let Some(step) = record.steps.get_mut(index) {
                step.status = StepStatus::Succeeded;
                step.output = Some(output.clone());
                step.selector = selector;
                step.healed = healed;
                step.error = None;
                step.finished_at = Some(Utc::now());
            }
            record.outputs.push(output);
            record.progress.completed += 1;
            record.current_step = index + 1;
            record.variables = variables.clone();
        });
    }

    pub fn fail_step(&self, index: usize, error: StepError) -> bool {
        let mut record = self.inner.write();
        if !Self::transition_locked(&mut record, ExecutionStatus::Failed) {
            return false;
        }
        if let Some(step) = record.steps.get_mut(index) {
            step.status = StepStatus::Failed;
            step.error = Some(error.clone());
            step.finished_at = Some(Utc::now());
        }
        record.progress.failed += 1;
        record.last_error = Some(error);
        true
    }

    pub fn succeed(&self) -> bool {
        self.transition(ExecutionStatus::Succeeded)
    }

    /// Mark cancelled from any non-terminal state.
    pub fn cancel(&self, reason: &str) -> bool {
        let mut record = self.inner.write();
        if !Self::transition_locked(&mut record, ExecutionStatus::Cancelled) {
            return false;
        }
        let index = record.current_step;
        if let Some(step) = record.steps.get_mut(index) {
            if !matches!(step.status, StepStatus::Succeeded | StepStatus::Pending) {
                step.status = StepStatus::Cancelled;
                step.finished_at = Some(Utc::now());
            }
        }
        record.last_error = Some(StepError::new(FailureCategory::CancellationRequested, reason));
        true
    }
}
