//! In-memory scripted surface implementing [`Host`].
//!
//! Pages map a url (or `*` for every page) to element specs. Elements can
//! appear late, change state after a number of queries, and raise scripted
//! interaction failures, which is enough to rehearse drift and flakiness
//! without a live session.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use soulflow_core_types::{ElementState, SessionId};
use tracing::trace;

use crate::{errors::ActionError, host::Host, types::Interaction};

/// Page key whose elements are present on every page.
pub const ANY_PAGE: &str = "*";

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Every selector that resolves to this element
    pub selectors: Vec<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub text: Option<String>,
    /// Number of queries answered as missing before the element exists
    #[serde(default)]
    pub appear_after: u32,
    #[serde(default)]
    pub changes: Vec<StateChange>,
    /// Clicking the element moves the session to this url
    #[serde(default)]
    pub navigates_to: Option<String>,
    #[serde(default)]
    pub fail_interactions: Option<ScriptedFailure>,
}

impl ElementSpec {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            visible: true,
            enabled: true,
            text: None,
            appear_after: 0,
            changes: Vec::new(),
            navigates_to: None,
            fail_interactions: None,
        }
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn appear_after(mut self, queries: u32) -> Self {
        self.appear_after = queries;
        self
    }

    pub fn change(mut self, change: StateChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn navigates_to(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    pub fn failing(mut self, error: ScriptedError, times: Option<u32>) -> Self {
        self.fail_interactions = Some(ScriptedFailure { error, times });
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|candidate| candidate == selector)
    }

    /// State after `queries` observations.
    fn state_at(&self, queries: u32) -> ElementState {
        let mut state = ElementState {
            exists: queries > self.appear_after,
            visible: self.visible,
            enabled: self.enabled,
        };
        for change in self.changes.iter().filter(|c| queries > c.after_queries) {
            if let Some(exists) = change.exists {
                state.exists = exists;
            }
            if let Some(visible) = change.visible {
                state.visible = visible;
            }
            if let Some(enabled) = change.enabled {
                state.enabled = enabled;
            }
        }
        state
    }
}

/// Scripted state flip applied once the element has been queried more than
/// `after_queries` times.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub after_queries: u32,
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedFailure {
    pub error: ScriptedError,
    /// `None` fails forever
    #[serde(default)]
    pub times: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedError {
    NotFound,
    NotActionable,
    Timeout,
    Network,
    Host,
}

impl ScriptedError {
    pub fn to_error(self, selector: &str) -> ActionError {
        let detail = format!("scripted failure on `{}`", selector);
        match self {
            ScriptedError::NotFound => ActionError::ElementNotFound(detail),
            ScriptedError::NotActionable => ActionError::ElementNotActionable(detail),
            ScriptedError::Timeout => ActionError::Timeout(detail),
            ScriptedError::Network => ActionError::Network(detail),
            ScriptedError::Host => ActionError::Host(detail),
        }
    }
}

/// One host call as observed by the surface.
#[derive(Clone, Debug, Serialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub session: SessionId,
    pub operation: String,
    pub target: String,
    pub at: DateTime<Utc>,
}

type ElementKey = (String, usize);

#[derive(Default)]
struct SessionState {
    url: Option<String>,
    query_counts: HashMap<ElementKey, u32>,
    failures_raised: HashMap<ElementKey, u32>,
    values: HashMap<ElementKey, String>,
    readiness_polls: u32,
    inflight: usize,
    max_inflight: usize,
}

#[derive(Default)]
pub struct MemoryHost {
    pages: RwLock<HashMap<String, Vec<ElementSpec>>>,
    sessions: Mutex<HashMap<SessionId, SessionState>>,
    query_failures: Mutex<HashMap<String, ActionError>>,
    navigation_failures: Mutex<HashMap<String, ActionError>>,
    journal: Mutex<Vec<JournalEntry>>,
    latency: Duration,
    ready_after: u32,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pages(pages: HashMap<String, Vec<ElementSpec>>) -> Self {
        Self {
            pages: RwLock::new(pages),
            ..Self::default()
        }
    }

    /// Delay applied to every host call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Readiness reports false for this many polls after each navigation.
    pub fn with_ready_after(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }

    pub fn add_element(&self, page: &str, element: ElementSpec) {
        self.pages
            .write()
            .entry(page.to_string())
            .or_default()
            .push(element);
    }

    pub fn fail_queries(&self, selector: &str, error: ActionError) {
        self.query_failures
            .lock()
            .insert(selector.to_string(), error);
    }

    pub fn fail_navigation(&self, url: &str, error: ActionError) {
        self.navigation_failures
            .lock()
            .insert(url.to_string(), error);
    }

    pub fn current_url(&self, session: &SessionId) -> Option<String> {
        self.sessions
            .lock()
            .get(session)
            .and_then(|state| state.url.clone())
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    pub fn journal_for(&self, session: &SessionId) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .iter()
            .filter(|entry| &entry.session == session)
            .cloned()
            .collect()
    }

    /// Highest number of simultaneous calls seen for one session.
    pub fn max_inflight(&self, session: &SessionId) -> usize {
        self.sessions
            .lock()
            .get(session)
            .map(|state| state.max_inflight)
            .unwrap_or(0)
    }

    fn locate(&self, url: Option<&str>, selector: &str) -> Option<(ElementKey, ElementSpec)> {
        let pages = self.pages.read();
        let scoped = url.into_iter().chain(std::iter::once(ANY_PAGE));
        for page in scoped {
            if let Some(elements) = pages.get(page) {
                if let Some((idx, spec)) = elements
                    .iter()
                    .enumerate()
                    .find(|(_, spec)| spec.matches(selector))
                {
                    return Some(((page.to_string(), idx), spec.clone()));
                }
            }
        }
        None
    }

    fn log(&self, session: &SessionId, operation: &str, target: &str) {
        let mut journal = self.journal.lock();
        let seq = journal.len() as u64;
        journal.push(JournalEntry {
            seq,
            session: session.clone(),
            operation: operation.to_string(),
            target: target.to_string(),
            at: Utc::now(),
        });
    }

    async fn enter(&self, session: &SessionId) -> CallGuard<'_> {
        {
            let mut sessions = self.sessions.lock();
            let state = sessions.entry(session.clone()).or_default();
            state.inflight += 1;
            state.max_inflight = state.max_inflight.max(state.inflight);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        CallGuard {
            host: self,
            session: session.clone(),
        }
    }
}

struct CallGuard<'a> {
    host: &'a MemoryHost,
    session: SessionId,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.host.sessions.lock().get_mut(&self.session) {
            state.inflight = state.inflight.saturating_sub(1);
        }
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn query_state(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> Result<ElementState, ActionError> {
        let _guard = self.enter(session).await;
        if let Some(error) = self.query_failures.lock().get(selector) {
            return Err(error.clone());
        }

        let url = self.current_url(session);
        let Some((key, spec)) = self.locate(url.as_deref(), selector) else {
            return Ok(ElementState::MISSING);
        };

        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.clone()).or_default();
        let count = state.query_counts.entry(key).or_insert(0);
        *count += 1;
        let observed = spec.state_at(*count);
        trace!(%session, %selector, queries = *count, ?observed, "memory query");
        Ok(observed)
    }

    async fn interact(
        &self,
        session: &SessionId,
        selector: &str,
        interaction: &Interaction,
        payload: &Value,
    ) -> Result<Value, ActionError> {
        let _guard = self.enter(session).await;
        self.log(session, interaction.name(), selector);

        let url = self.current_url(session);
        let Some((key, spec)) = self.locate(url.as_deref(), selector) else {
            return Err(ActionError::ElementNotFound(format!(
                "no element matches `{}`",
                selector
            )));
        };

        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.clone()).or_default();
        let observed = spec.state_at(state.query_counts.get(&key).copied().unwrap_or(0).max(1));
        if !observed.exists {
            return Err(ActionError::ElementNotFound(format!(
                "`{}` is not attached",
                selector
            )));
        }

        if let Some(failure) = &spec.fail_interactions {
            let raised = state.failures_raised.entry(key.clone()).or_insert(0);
            if failure.times.map_or(true, |limit| *raised < limit) {
                *raised += 1;
                return Err(failure.error.to_error(selector));
            }
        }

        match interaction {
            Interaction::Click => {
                if !(observed.visible && observed.enabled) {
                    return Err(ActionError::ElementNotActionable(format!(
                        "`{}` cannot receive clicks",
                        selector
                    )));
                }
                if let Some(target) = &spec.navigates_to {
                    state.url = Some(target.clone());
                    state.readiness_polls = 0;
                }
                Ok(json!({ "clicked": selector }))
            }
            Interaction::Type => {
                if !observed.enabled {
                    return Err(ActionError::ElementNotActionable(format!(
                        "`{}` is disabled",
                        selector
                    )));
                }
                let text = payload
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                state.values.insert(key, text.clone());
                Ok(json!({ "typed": text }))
            }
            Interaction::Extract => {
                let value = state
                    .values
                    .get(&key)
                    .cloned()
                    .or(spec.text)
                    .unwrap_or_default();
                Ok(Value::String(value))
            }
            Interaction::Custom(name) => Ok(json!({ "action": name, "selector": selector })),
        }
    }

    async fn navigate(&self, session: &SessionId, url: &str) -> Result<(), ActionError> {
        let _guard = self.enter(session).await;
        self.log(session, "navigate", url);
        if let Some(error) = self.navigation_failures.lock().get(url) {
            return Err(error.clone());
        }
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.clone()).or_default();
        state.url = Some(url.to_string());
        state.readiness_polls = 0;
        Ok(())
    }

    async fn readiness(&self, session: &SessionId) -> Result<bool, ActionError> {
        let _guard = self.enter(session).await;
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.clone()).or_default();
        state.readiness_polls += 1;
        Ok(state.readiness_polls > self.ready_after)
    }

    async fn capture(&self, session: &SessionId) -> Result<Vec<u8>, ActionError> {
        let _guard = self.enter(session).await;
        let url = self.current_url(session).unwrap_or_else(|| "about:blank".into());
        self.log(session, "capture", &url);
        Ok(format!("capture:{}", url).into_bytes())
    }
}
