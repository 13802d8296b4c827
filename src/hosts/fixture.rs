//! Local session simulation loaded from a JSON surface description.
//!
//! ```json
//! {
//!   "start_url": "https://shop.test/",
//!   "ready_after": 1,
//!   "latency_ms": 5,
//!   "pages": { "https://shop.test/cart": [ { "selectors": ["#pay"], "enabled": false } ] },
//!   "traffic": { "https://shop.test/cart": [ { "url": "https://shop.test/api/cart", "status": 200, "duration_ms": 30 } ] },
//!   "navigation_failures": { "https://shop.test/down": "network" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::memory::{ElementSpec, JournalEntry, MemoryHost, ScriptedError};
use action_primitives::{ActionError, Host, Interaction};
use async_trait::async_trait;
use network_tap_light::{NetworkMonitor, RequestOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soulflow_core_types::{ElementState, SessionId};
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::errors::{Result, SoulFlowError};

/// Simulated request issued by a page load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub failed: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Surface {
    pub start_url: Option<String>,
    pub ready_after: u32,
    pub latency_ms: u64,
    pub pages: HashMap<String, Vec<ElementSpec>>,
    /// Requests fired after navigating to a url
    pub traffic: HashMap<String, Vec<SimulatedRequest>>,
    pub navigation_failures: HashMap<String, ScriptedError>,
}

impl Surface {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(SoulFlowError::Surface)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SoulFlowError::read(path, err))?;
        Self::from_json(&raw)
    }
}

/// [`Host`] over an in-memory surface that also feeds the network monitor,
/// so idle waits see page-load traffic.
pub struct FixtureHost {
    memory: MemoryHost,
    monitor: Arc<NetworkMonitor>,
    traffic: HashMap<String, Vec<SimulatedRequest>>,
    start_url: Option<String>,
}

impl FixtureHost {
    pub fn new(surface: Surface, monitor: Arc<NetworkMonitor>) -> Self {
        let memory = MemoryHost::from_pages(surface.pages)
            .with_latency(Duration::from_millis(surface.latency_ms))
            .with_ready_after(surface.ready_after);
        for (url, failure) in &surface.navigation_failures {
            memory.fail_navigation(url, failure.to_error(url));
        }
        Self {
            memory,
            monitor,
            traffic: surface.traffic,
            start_url: surface.start_url,
        }
    }

    pub fn memory(&self) -> &MemoryHost {
        &self.memory
    }

    pub fn journal_for(&self, session: &SessionId) -> Vec<JournalEntry> {
        self.memory.journal_for(session)
    }

    /// Put a fresh session on the surface's start page, if one is set.
    pub async fn open(&self, session: &SessionId) -> std::result::Result<(), ActionError> {
        match &self.start_url {
            Some(url) => self.memory.navigate(session, url).await,
            None => Ok(()),
        }
    }

    fn replay_traffic(&self, url: &str) {
        let Some(requests) = self.traffic.get(url) else {
            return;
        };
        debug!(url, requests = requests.len(), "replaying page-load traffic");
        for request in requests.iter().cloned() {
            let monitor = Arc::clone(&self.monitor);
            let id = monitor.on_request_start(request.url.clone(), request.method.clone());
            let finish = move || {
                let outcome = if request.failed {
                    RequestOutcome::Failed
                } else {
                    RequestOutcome::Succeeded
                };
                trace!(url = %request.url, "simulated request finished");
                monitor.on_request_end(id, request.status, outcome);
            };
            if request.duration_ms == 0 {
                finish();
            } else {
                let delay = Duration::from_millis(request.duration_ms);
                tokio::spawn(async move {
                    sleep(delay).await;
                    finish();
                });
            }
        }
    }
}

#[async_trait]
impl Host for FixtureHost {
    async fn query_state(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> std::result::Result<ElementState, ActionError> {
        self.memory.query_state(session, selector).await
    }

    async fn interact(
        &self,
        session: &SessionId,
        selector: &str,
        interaction: &Interaction,
        payload: &Value,
    ) -> std::result::Result<Value, ActionError> {
        self.memory
            .interact(session, selector, interaction, payload)
            .await
    }

    async fn navigate(&self, session: &SessionId, url: &str) -> std::result::Result<(), ActionError> {
        self.memory.navigate(session, url).await?;
        self.replay_traffic(url);
        Ok(())
    }

    async fn readiness(&self, session: &SessionId) -> std::result::Result<bool, ActionError> {
        self.memory.readiness(session).await
    }

    async fn capture(&self, session: &SessionId) -> std::result::Result<Vec<u8>, ActionError> {
        self.memory.capture(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: &str = r##"{
        "ready_after": 1,
        "pages": {
            "https://shop.test/cart": [
                { "selectors": ["#pay"], "enabled": false,
                  "changes": [ { "after_queries": 2, "enabled": true } ] }
            ]
        },
        "traffic": {
            "https://shop.test/cart": [ { "url": "https://shop.test/api/cart", "status": 200, "duration_ms": 40 } ]
        },
        "navigation_failures": { "https://shop.test/down": "network" }
    }"##;

    fn host() -> (FixtureHost, Arc<NetworkMonitor>) {
        let monitor = Arc::new(NetworkMonitor::default());
        let surface = Surface::from_json(SURFACE).unwrap();
        (FixtureHost::new(surface, Arc::clone(&monitor)), monitor)
    }

    #[tokio::test]
    async fn navigation_feeds_the_monitor() {
        let (host, monitor) = host();
        let session = SessionId::from("f");
        host.navigate(&session, "https://shop.test/cart").await.unwrap();
        assert_eq!(monitor.inflight(), 1);

        sleep(Duration::from_millis(80)).await;
        assert_eq!(monitor.inflight(), 0);
        assert_eq!(monitor.snapshot()[0].status, Some(200));
    }

    #[tokio::test]
    async fn scripted_state_changes_apply_per_query() {
        let (host, _) = host();
        let session = SessionId::from("f");
        host.navigate(&session, "https://shop.test/cart").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(host.query_state(&session, "#pay").await.unwrap().enabled);
        }
        assert_eq!(seen, vec![false, false, true]);
    }

    #[tokio::test]
    async fn navigation_failures_are_typed() {
        let (host, _) = host();
        let err = host
            .navigate(&SessionId::from("f"), "https://shop.test/down")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Network(_)));
    }

    #[test]
    fn malformed_surface_is_rejected() {
        assert!(matches!(
            Surface::from_json("{ \"pages\": 4 }"),
            Err(SoulFlowError::Surface(_))
        ));
    }
}
