//! Polling auto-wait over the host contract

use std::sync::Arc;
use std::time::{Duration, Instant};

use network_tap_light::{NetworkMonitor, TapError};
use soulflow_core_types::{ElementState, WaitState};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    errors::ActionError,
    host::Host,
    types::{ExecCtx, WaitConfig, WaitFailure, WaitOptions},
};

/// Floor for a single host query when the remaining budget is nearly spent.
const MIN_QUERY_BUDGET: Duration = Duration::from_millis(5);

/// Consecutive ready observations required before navigation counts as settled.
const SETTLE_STREAK: u32 = 2;

/// Auto-wait engine. Polls the host until a condition holds or its own
/// deadline expires, checking the cancellation token on every tick.
pub struct AutoWait {
    host: Arc<dyn Host>,
    network: Arc<NetworkMonitor>,
    config: WaitConfig,
}

impl AutoWait {
    pub fn new(host: Arc<dyn Host>, network: Arc<NetworkMonitor>, config: WaitConfig) -> Self {
        Self {
            host,
            network,
            config,
        }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Resolve once `selector` reaches `state`, else fail with
    /// [`ActionError::Timeout`].
    pub async fn wait(
        &self,
        ctx: &ExecCtx,
        selector: &str,
        state: WaitState,
        options: WaitOptions,
    ) -> Result<ElementState, ActionError> {
        self.poll_element(ctx, selector, state, options)
            .await
            .map_err(ActionError::from)
    }

    /// Same as [`AutoWait::wait`] but keeps the last observation on failure.
    pub async fn poll_element(
        &self,
        ctx: &ExecCtx,
        selector: &str,
        state: WaitState,
        options: WaitOptions,
    ) -> Result<ElementState, WaitFailure> {
        let budget = options.timeout.unwrap_or_else(|| self.config.timeout());
        let interval = options
            .poll_interval
            .unwrap_or_else(|| self.config.poll_interval())
            .max(Duration::from_millis(1));
        let deadline = Instant::now() + budget;
        let mut last_seen: Option<ElementState> = None;
        let mut polls = 0u32;

        loop {
            if ctx.is_cancelled() {
                return Err(WaitFailure::new(cancelled(), last_seen));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            polls += 1;
            let observed = match timeout(
                remaining.max(MIN_QUERY_BUDGET),
                self.host.query_state(&ctx.session, selector),
            )
            .await
            {
                Ok(Ok(observed)) => observed,
                Ok(Err(err)) => {
                    debug!(%selector, error = %err, "host query failed during wait");
                    return Err(WaitFailure::new(err, last_seen));
                }
                Err(_) => {
                    return Err(WaitFailure::new(
                        timeout_error(selector, state, budget, last_seen),
                        last_seen,
                    ))
                }
            };

            trace!(%selector, polls, ?observed, "poll");
            if observed.satisfies(state) {
                return Ok(observed);
            }
            last_seen = Some(observed);

            let now = Instant::now();
            if now >= deadline {
                debug!(%selector, %state, polls, "wait exhausted");
                return Err(WaitFailure::new(
                    timeout_error(selector, state, budget, last_seen),
                    last_seen,
                ));
            }

            let pause = interval.min(deadline - now);
            if cancellable_sleep(&ctx.cancel_token, pause).await.is_err() {
                return Err(WaitFailure::new(cancelled(), last_seen));
            }
        }
    }

    /// Poll host readiness until it reports ready on consecutive ticks.
    pub async fn wait_for_navigation_settled(
        &self,
        ctx: &ExecCtx,
        budget: Option<Duration>,
    ) -> Result<(), ActionError> {
        let budget = budget.unwrap_or_else(|| self.config.settle_timeout());
        let interval = self.config.poll_interval();
        let deadline = Instant::now() + budget;
        let mut streak = 0u32;

        loop {
            ctx.ensure_active()?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let ready = match timeout(
                remaining.max(MIN_QUERY_BUDGET),
                self.host.readiness(&ctx.session),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => false,
            };

            streak = if ready { streak + 1 } else { 0 };
            if streak >= SETTLE_STREAK {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ActionError::Timeout(format!(
                    "navigation did not settle within {}ms",
                    budget.as_millis()
                )));
            }
            cancellable_sleep(&ctx.cancel_token, interval.min(deadline - now)).await?;
        }
    }

    /// Resolve once no request started within `idle_window` and none is in
    /// flight.
    pub async fn wait_for_network_idle(
        &self,
        ctx: &ExecCtx,
        idle_window: Option<Duration>,
        budget: Option<Duration>,
    ) -> Result<Duration, ActionError> {
        let idle_window = idle_window.unwrap_or_else(|| self.config.idle_window());
        let budget = budget.unwrap_or_else(|| self.config.idle_timeout());

        self.network
            .wait_for_idle(idle_window, budget, &ctx.cancel_token)
            .await
            .map_err(|err| match err {
                TapError::Cancelled => cancelled(),
                TapError::Timeout(ms) => ActionError::Timeout(format!(
                    "network not idle for {}ms within {}ms",
                    idle_window.as_millis(),
                    ms
                )),
                TapError::ChannelClosed => {
                    warn!("network feed closed while waiting for idle");
                    ActionError::Network(err.to_string())
                }
            })
    }

    /// Fixed pause that still honours cancellation.
    pub async fn pause(&self, ctx: &ExecCtx, duration: Duration) -> Result<(), ActionError> {
        ctx.ensure_active()?;
        cancellable_sleep(&ctx.cancel_token, duration).await
    }
}

/// Sleep for `duration` unless the token fires first.
pub async fn cancellable_sleep(
    token: &CancellationToken,
    duration: Duration,
) -> Result<(), ActionError> {
    tokio::select! {
        _ = token.cancelled() => Err(cancelled()),
        _ = sleep(duration) => Ok(()),
    }
}

fn cancelled() -> ActionError {
    ActionError::Cancelled("context cancelled".to_string())
}

fn timeout_error(
    selector: &str,
    state: WaitState,
    budget: Duration,
    last_seen: Option<ElementState>,
) -> ActionError {
    match last_seen {
        Some(seen) if seen.exists => ActionError::Timeout(format!(
            "selector `{}` found but not actionable: not {} after {}ms",
            selector,
            state,
            budget.as_millis()
        )),
        _ => ActionError::Timeout(format!(
            "selector `{}` did not become {} within {}ms",
            selector,
            state,
            budget.as_millis()
        )),
    }
}
