//! SoulFlow network activity monitor.
//!
//! Pure bookkeeping over request/response events delivered by the host's
//! traffic hooks: a bounded ring of completed events, the set of in-flight
//! requests, aggregate statistics and idle-window detection. Each engine gets
//! its own instance; nothing here is process-global.

pub mod config;

pub use config::TapConfig;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout_at, Instant as TokioInstant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

const FEED_BUFFER: usize = 256;

/// Identifier of one request observed by the monitor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Succeeded,
    Failed,
    Pending,
}

/// A completed request. Immutable once recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub id: RequestId,
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RequestOutcome,
}

impl NetworkEvent {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            url: url.into(),
            method: method.into(),
            status: None,
            started_at: Utc::now(),
            duration_ms: 0,
            outcome: RequestOutcome::Succeeded,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_outcome(mut self, outcome: RequestOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == RequestOutcome::Failed || self.status.is_some_and(|s| s >= 400)
    }
}

/// Aggregates over the retained window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub count: usize,
    pub failures: usize,
    pub inflight: usize,
    pub evicted: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TapError {
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("wait cancelled")]
    Cancelled,
    #[error("event feed closed")]
    ChannelClosed,
}

/// URL matcher used by [`NetworkMonitor::wait_for_request`].
///
/// Patterns are regular expressions; a pattern that does not compile is
/// matched as a plain substring.
#[derive(Clone, Debug)]
pub enum UrlPattern {
    Regex(Regex),
    Substring(String),
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => UrlPattern::Regex(regex),
            Err(_) => UrlPattern::Substring(pattern.to_string()),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Regex(regex) => regex.is_match(url),
            UrlPattern::Substring(needle) => url.contains(needle.as_str()),
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    url: String,
    method: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

pub struct NetworkMonitor {
    config: TapConfig,
    events: Mutex<VecDeque<NetworkEvent>>,
    inflight: DashMap<RequestId, PendingRequest>,
    last_start: Mutex<Option<Instant>>,
    feed: broadcast::Sender<NetworkEvent>,
    evicted: AtomicU64,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(TapConfig::default())
    }
}

impl NetworkMonitor {
    pub fn new(config: TapConfig) -> Self {
        let (feed, _) = broadcast::channel(FEED_BUFFER);
        Self {
            events: Mutex::new(VecDeque::with_capacity(config.capacity.min(4096))),
            inflight: DashMap::new(),
            last_start: Mutex::new(None),
            feed,
            evicted: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Append a completed event. Its start time counts as activity for idle
    /// detection.
    pub fn record(&self, event: NetworkEvent) {
        let age = (Utc::now() - event.started_at).to_std().unwrap_or_default();
        let now = Instant::now();
        self.touch(now.checked_sub(age).unwrap_or(now));
        self.push(event);
    }

    /// Host hook: a request has been issued.
    pub fn on_request_start(&self, url: impl Into<String>, method: impl Into<String>) -> RequestId {
        let id = RequestId::new();
        let now = Instant::now();
        let url = url.into();
        trace!(request = ?id, %url, "request started");
        self.inflight.insert(
            id,
            PendingRequest {
                url,
                method: method.into(),
                started_at: Utc::now(),
                started: now,
            },
        );
        self.touch(now);
        id
    }

    /// Host hook: a request finished. Unknown ids are ignored.
    pub fn on_request_end(
        &self,
        id: RequestId,
        status: Option<u16>,
        outcome: RequestOutcome,
    ) -> Option<NetworkEvent> {
        let (_, pending) = self.inflight.remove(&id)?;
        let event = NetworkEvent {
            id,
            url: pending.url,
            method: pending.method,
            status,
            started_at: pending.started_at,
            duration_ms: pending.started.elapsed().as_millis() as u64,
            outcome,
        };
        self.push(event.clone());
        Some(event)
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<NetworkEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.feed.subscribe()
    }

    /// Time since the most recent request start, `None` if nothing was seen.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_start.lock().map(|at| at.elapsed())
    }

    /// No request in flight and none started within the trailing window.
    pub fn is_idle(&self, idle_window: Duration) -> bool {
        if !self.inflight.is_empty() {
            return false;
        }
        self.idle_for().map_or(true, |idle| idle >= idle_window)
    }

    pub fn stats(&self) -> NetworkStats {
        let guard = self.events.lock();
        let mut durations: Vec<u64> = guard.iter().map(|e| e.duration_ms).collect();
        let failures = guard.iter().filter(|e| e.is_failure()).count();
        drop(guard);

        durations.sort_unstable();
        let count = durations.len();
        let mean_ms = if count == 0 {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / count as f64
        };

        NetworkStats {
            count,
            failures,
            inflight: self.inflight.len(),
            evicted: self.evicted.load(Ordering::Relaxed),
            mean_ms,
            p50_ms: percentile(&durations, 50.0),
            p95_ms: percentile(&durations, 95.0),
            max_ms: durations.last().copied().unwrap_or(0),
        }
    }

    /// Resolve with the first matching event recorded at or after the call.
    pub async fn wait_for_request(
        &self,
        url_pattern: &str,
        timeout: Duration,
    ) -> Result<NetworkEvent, TapError> {
        let pattern = UrlPattern::new(url_pattern);
        let mut rx = self.feed.subscribe();
        let deadline = TokioInstant::now() + timeout;

        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Ok(event)) if pattern.matches(&event.url) => return Ok(event),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "request waiter lagged behind event feed");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(TapError::ChannelClosed),
                Err(_) => return Err(TapError::Timeout(timeout.as_millis() as u64)),
            }
        }
    }

    /// Resolve once the monitor has been idle for `idle_window`.
    ///
    /// Returns how long the caller waited.
    pub async fn wait_for_idle(
        &self,
        idle_window: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Duration, TapError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let tick = Duration::from_millis(self.config.poll_interval_ms.max(1))
            .min(idle_window / 4)
            .max(Duration::from_millis(1));

        loop {
            if cancel.is_cancelled() {
                return Err(TapError::Cancelled);
            }
            if self.is_idle(idle_window) {
                return Ok(started.elapsed());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TapError::Timeout(timeout.as_millis() as u64));
            }
            let pause = tick.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(TapError::Cancelled),
                _ = sleep(pause) => {}
            }
        }
    }

    fn touch(&self, at: Instant) {
        let mut guard = self.last_start.lock();
        match *guard {
            Some(previous) if previous >= at => {}
            _ => *guard = Some(at),
        }
    }

    fn push(&self, event: NetworkEvent) {
        {
            let mut guard = self.events.lock();
            if self.config.capacity > 0 && guard.len() >= self.config.capacity {
                guard.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            guard.push_back(event.clone());
        }
        let _ = self.feed.send(event);
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
