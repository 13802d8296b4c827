//! Self-healing resolution over a ranked selector set

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::{ActionError, AutoWait, ExecCtx, WaitOptions};
use async_trait::async_trait;
use soulflow_core_types::WaitState;
use tracing::{debug, info, warn};

use crate::{
    errors::LocatorFailure,
    strategies::SelectorGenerator,
    types::{Attempt, AttemptReason, ElementDescriptor, Resolved, SelectorSet},
};

/// Element resolution seam used by the step runner.
#[async_trait]
pub trait ElementLocator: Send + Sync {
    async fn resolve(
        &self,
        ctx: &ExecCtx,
        selectors: &SelectorSet,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Resolved, LocatorFailure>;
}

/// Tries each candidate in order, splitting the remaining budget evenly
/// across the candidates not yet tried. Never retries internally.
pub struct SelfHealingLocator {
    waiter: Arc<AutoWait>,
}

impl SelfHealingLocator {
    pub fn new(waiter: Arc<AutoWait>) -> Self {
        Self { waiter }
    }
}

#[async_trait]
impl ElementLocator for SelfHealingLocator {
    async fn resolve(
        &self,
        ctx: &ExecCtx,
        selectors: &SelectorSet,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Resolved, LocatorFailure> {
        let deadline = Instant::now() + timeout;
        let total = selectors.len();
        let mut attempts: Vec<Attempt> = Vec::with_capacity(total);

        for (index, selector) in selectors.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(LocatorFailure::Cancelled { attempts });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining / (total - index) as u32;
            let started = Instant::now();
            debug!(
                action_id = %ctx.action_id,
                %selector,
                index,
                slice_ms = slice.as_millis() as u64,
                "trying selector"
            );

            match self
                .waiter
                .poll_element(ctx, selector, state, WaitOptions::with_timeout(slice))
                .await
            {
                Ok(observed) => {
                    if index > 0 {
                        info!(
                            action_id = %ctx.action_id,
                            original = %selectors.primary(),
                            healed = %selector,
                            index,
                            "selector healed"
                        );
                    }
                    return Ok(Resolved {
                        selector: selector.to_string(),
                        index,
                        state: observed,
                        rejected: attempts,
                    });
                }
                Err(failure) => {
                    let not_actionable = failure.found_but_not_actionable();
                    let reason = match failure.error {
                        ActionError::Cancelled(_) => {
                            return Err(LocatorFailure::Cancelled { attempts });
                        }
                        ActionError::Timeout(_) if not_actionable => {
                            AttemptReason::NotActionable
                        }
                        ActionError::Timeout(_) => AttemptReason::NotFound,
                        other => {
                            warn!(%selector, error = %other, "host error while resolving");
                            AttemptReason::HostError(other)
                        }
                    };
                    attempts.push(Attempt {
                        selector: selector.to_string(),
                        reason,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }

        warn!(
            action_id = %ctx.action_id,
            tried = attempts.len(),
            "selector set exhausted"
        );
        Err(LocatorFailure::Exhausted { attempts })
    }
}

/// Append up to `limit` generated candidates not already in `set`.
///
/// Returns the selectors that were added, in generation order.
pub fn widen(set: &mut SelectorSet, descriptor: &ElementDescriptor, limit: usize) -> Vec<String> {
    let mut added = Vec::new();
    if limit == 0 {
        return added;
    }
    for (_, candidate) in SelectorGenerator::new().ranked(descriptor) {
        if set.push(candidate.clone()) {
            added.push(candidate);
            if added.len() >= limit {
                break;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::memory::{ElementSpec, MemoryHost, ANY_PAGE};
    use action_primitives::WaitConfig;
    use network_tap_light::NetworkMonitor;
    use soulflow_core_types::SessionId;
    use tokio_util::sync::CancellationToken;

    fn locator(host: MemoryHost) -> SelfHealingLocator {
        let waiter = AutoWait::new(
            Arc::new(host),
            Arc::new(NetworkMonitor::default()),
            WaitConfig {
                poll_interval_ms: 5,
                ..WaitConfig::default()
            },
        );
        SelfHealingLocator::new(Arc::new(waiter))
    }

    fn ctx() -> ExecCtx {
        ExecCtx::new(SessionId::from("heal"), CancellationToken::new())
    }

    #[tokio::test]
    async fn primary_hit_is_not_healed() {
        let host = MemoryHost::new();
        host.add_element(ANY_PAGE, ElementSpec::new(["#go"]));
        let set = SelectorSet::new(["#go", "#other"]).unwrap();

        let resolved = locator(host)
            .resolve(&ctx(), &set, WaitState::Visible, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(resolved.index, 0);
        assert!(!resolved.healed());
        assert!(resolved.rejected.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_secondary_selector() {
        let host = MemoryHost::new();
        host.add_element(ANY_PAGE, ElementSpec::new(["[data-testid=\"go\"]"]));
        let set = SelectorSet::new(["#gone", "[data-testid=\"go\"]"]).unwrap();

        let resolved = locator(host)
            .resolve(&ctx(), &set, WaitState::Visible, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(resolved.healed());
        assert_eq!(resolved.selector, "[data-testid=\"go\"]");
        assert_eq!(resolved.rejected.len(), 1);
        assert_eq!(resolved.rejected[0].reason, AttemptReason::NotFound);
    }

    #[tokio::test]
    async fn exhaustion_lists_every_selector_in_order() {
        let host = MemoryHost::new();
        host.add_element(ANY_PAGE, ElementSpec::new(["#hidden"]).visible(false));
        host.fail_queries("#broken", ActionError::Host("detached frame".into()));
        let set = SelectorSet::new(["#missing", "#hidden", "#broken"]).unwrap();

        let failure = locator(host)
            .resolve(&ctx(), &set, WaitState::Visible, Duration::from_millis(60))
            .await
            .unwrap_err();

        assert_eq!(failure.selectors(), vec!["#missing", "#hidden", "#broken"]);
        let reasons: Vec<AttemptReason> =
            failure.attempts().iter().map(|a| a.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                AttemptReason::NotFound,
                AttemptReason::NotActionable,
                AttemptReason::HostError(ActionError::Host("detached frame".into())),
            ]
        );
    }

    #[tokio::test]
    async fn spent_budget_still_tries_each_candidate() {
        let set = SelectorSet::new(["#a", "#b", "#c"]).unwrap();
        let failure = locator(MemoryHost::new())
            .resolve(&ctx(), &set, WaitState::Attached, Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts().len(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_immediately() {
        let ctx = ctx();
        ctx.cancel_token.cancel();
        let set = SelectorSet::new(["#a", "#b"]).unwrap();
        let failure = locator(MemoryHost::new())
            .resolve(&ctx, &set, WaitState::Visible, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(failure, LocatorFailure::Cancelled { ref attempts } if attempts.is_empty()));
    }

    #[test]
    fn attached_state_accepts_hidden_elements() {
        let host = MemoryHost::new();
        host.add_element(ANY_PAGE, ElementSpec::new(["#menu"]).visible(false));
        let set = SelectorSet::new(["#menu"]).unwrap();

        let resolved = tokio_test::block_on(locator(host).resolve(
            &ctx(),
            &set,
            WaitState::Attached,
            Duration::from_millis(100),
        ))
        .unwrap();
        assert_eq!(resolved.selector, "#menu");
        assert!(!resolved.state.visible);
    }

    #[test]
    fn widen_adds_only_new_candidates() {
        let descriptor = ElementDescriptor {
            tag: Some("button".into()),
            id: Some("go".into()),
            role: Some("button".into()),
            aria_label: Some("Go".into()),
            data_testid: Some("go".into()),
            ..ElementDescriptor::default()
        };
        let mut set = SelectorSet::new(["#go"]).unwrap();

        let added = widen(&mut set, &descriptor, 1);
        assert_eq!(added, vec![r#"role=button[name="Go"]"#.to_string()]);

        let added = widen(&mut set, &descriptor, 5);
        assert_eq!(added, vec![r#"[data-testid="go"]"#.to_string(), "button".to_string()]);
        assert!(widen(&mut set, &descriptor, 3).is_empty());
        assert_eq!(set.len(), 4);
    }
}
