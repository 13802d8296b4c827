//! Per-execution step runner

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{
    generate, widen, ElementDescriptor, ElementLocator, Resolved, SelectorSet, SelfHealingLocator,
};
use action_primitives::{
    cancellable_sleep, ActionError, AutoWait, ExecCtx, Interaction, WaitConfig,
};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use soulflow_core_types::WaitState;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{classify, FailureCategory};
use crate::policy::{decide, RetryDecision, RetryPolicy};
use crate::types::*;
use crate::variables::{merge_bindings, resolve, VariableBag};

/// Runs one workflow against one execution record.
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Drive `handle` to a terminal status. Never returns an error; every
    /// outcome is written to the record.
    async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        handle: &ExecutionHandle,
        cancel: CancellationToken,
    );
}

pub struct DefaultFlowExecutor {
    waiter: Arc<AutoWait>,
    locator: Arc<dyn ElementLocator>,
    policy: RetryPolicy,
}

impl DefaultFlowExecutor {
    pub fn new(waiter: Arc<AutoWait>, locator: Arc<dyn ElementLocator>, policy: RetryPolicy) -> Self {
        Self {
            waiter,
            locator,
            policy,
        }
    }

    /// Executor backed by the self-healing locator over the same waiter.
    pub fn with_policy(waiter: Arc<AutoWait>, policy: RetryPolicy) -> Self {
        let locator = Arc::new(SelfHealingLocator::new(Arc::clone(&waiter)));
        Self::new(waiter, locator, policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl FlowExecutor for DefaultFlowExecutor {
    async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        handle: &ExecutionHandle,
        cancel: CancellationToken,
    ) {
        let execution_id = handle.id();
        if !handle.transition(ExecutionStatus::Running) {
            debug!(%execution_id, status = %handle.status(), "execution not runnable");
            return;
        }
        info!(%execution_id, steps = workflow.steps.len(), "execution started");

        let ctx = ExecCtx::new(handle.session(), cancel.clone());
        let mut bag: VariableBag = workflow.variables.clone();

        for (index, step) in workflow.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                handle.cancel("cancellation requested");
                info!(%execution_id, step = index, "execution cancelled");
                return;
            }

            handle.begin_step(index);
            match self.run_step(&ctx, handle, index, step, &mut bag).await {
                StepOutcome::Completed(done) => {
                    debug!(
                        %execution_id,
                        step = index,
                        selector = done.selector.as_deref().unwrap_or(""),
                        healed = done.healed,
                        "step completed"
                    );
                    handle.complete_step(index, done.output, done.selector, done.healed, &bag);
                }
                StepOutcome::Failed(error) => {
                    warn!(
                        %execution_id,
                        step = index,
                        category = %error.category,
                        error = %error.message,
                        "execution failed"
                    );
                    handle.fail_step(index, error);
                    return;
                }
                StepOutcome::Cancelled => {
                    handle.cancel("cancellation requested");
                    info!(%execution_id, step = index, "execution cancelled");
                    return;
                }
            }
        }

        if handle.succeed() {
            info!(%execution_id, "execution succeeded");
        }
    }
}

struct Target {
    selectors: SelectorSet,
    descriptor: Option<ElementDescriptor>,
}

struct Completed {
    output: Value,
    selector: Option<String>,
    healed: bool,
}

impl Completed {
    fn plain(output: Value) -> Self {
        Self {
            output,
            selector: None,
            healed: false,
        }
    }

    fn on(resolved: &Resolved, output: Value) -> Self {
        Self {
            output,
            selector: Some(resolved.selector.clone()),
            healed: resolved.healed(),
        }
    }
}

/// Time allowed for one attempt of a step.
///
/// A per-step `timeout_ms` overrides both the element wait and the
/// navigation settle budget; otherwise each falls back to its config value.
#[derive(Clone, Copy, Debug)]
struct StepBudget {
    action: Duration,
    settle: Duration,
}

impl StepBudget {
    fn new(step_timeout: Option<u64>, config: &WaitConfig) -> Self {
        match step_timeout.map(Duration::from_millis) {
            Some(timeout) => Self {
                action: timeout,
                settle: timeout,
            },
            None => Self {
                action: config.timeout(),
                settle: config.settle_timeout(),
            },
        }
    }

    fn grow(&mut self, factor: f64) {
        self.action = self.action.mul_f64(factor);
        self.settle = self.settle.mul_f64(factor);
    }
}

struct Failure {
    error: ActionError,
    selectors: Vec<String>,
}

impl From<ActionError> for Failure {
    fn from(error: ActionError) -> Self {
        Self {
            error,
            selectors: Vec::new(),
        }
    }
}

enum StepOutcome {
    Completed(Completed),
    Failed(StepError),
    Cancelled,
}

impl DefaultFlowExecutor {
    async fn run_step(
        &self,
        ctx: &ExecCtx,
        handle: &ExecutionHandle,
        index: usize,
        step: &Step,
        bag: &mut VariableBag,
    ) -> StepOutcome {
        let execution_id = handle.id();
        let mut unresolved = merge_bindings(bag, &step.variables);
        let resolution = resolve(&Value::Object(step.parameters.clone()), bag);
        unresolved.extend(resolution.unresolved);
        if !unresolved.is_empty() {
            warn!(%execution_id, step = index, ?unresolved, "unknown variables left verbatim");
        }
        let params = match resolution.value {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut target = target_for(step, &params, bag);
        let mut budget = StepBudget::new(step.timeout_ms, self.waiter.config());
        let mut attempt: u32 = 1;

        loop {
            if ctx.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            let result = match &target {
                Ok(target) => {
                    self.dispatch(ctx, &step.action, &params, target.as_ref(), budget)
                        .await
                }
                Err(error) => Err(Failure::from(error.clone())),
            };

            let failure = match result {
                Ok(done) => {
                    if step.action == ActionKind::Extract {
                        bag.insert(format!("step_{}", index), done.output.clone());
                        if let Some(name) = params.get("store_as").and_then(Value::as_str) {
                            bag.insert(name.to_string(), done.output.clone());
                        }
                    }
                    return StepOutcome::Completed(done);
                }
                Err(failure) => failure,
            };

            let category = classify(&failure.error);
            if category == FailureCategory::CancellationRequested {
                return StepOutcome::Cancelled;
            }

            let decision = if failure.error.is_retryable() {
                decide(category, attempt, &self.policy)
            } else {
                RetryDecision::stop()
            };
            let error = StepError {
                category,
                message: failure.error.to_string(),
                selectors: failure.selectors,
            };

            if !decision.should_retry {
                return StepOutcome::Failed(error);
            }

            warn!(
                %execution_id,
                step = index,
                attempt,
                category = %category,
                delay_ms = decision.delay.as_millis() as u64,
                error = %error.message,
                "step failed, retrying"
            );
            if !handle.record_retry(index, &error) {
                return StepOutcome::Cancelled;
            }

            let adjustments = &decision.adjustments;
            if adjustments.widen_selectors > 0 {
                if let Ok(Some(target)) = target.as_mut() {
                    if let Some(descriptor) = target.descriptor.as_ref() {
                        let added = widen(
                            &mut target.selectors,
                            descriptor,
                            adjustments.widen_selectors,
                        );
                        debug!(%execution_id, step = index, ?added, "selector set widened");
                    }
                }
            }
            if adjustments.timeout_multiplier > 1.0 {
                budget.grow(adjustments.timeout_multiplier);
            }

            if cancellable_sleep(&ctx.cancel_token, decision.delay)
                .await
                .is_err()
            {
                return StepOutcome::Cancelled;
            }

            if adjustments.wait_for_network_idle {
                match self.waiter.wait_for_network_idle(ctx, None, None).await {
                    Ok(_) => {}
                    Err(ActionError::Cancelled(_)) => return StepOutcome::Cancelled,
                    Err(err) => {
                        warn!(%execution_id, step = index, error = %err, "network idle pre-wait failed")
                    }
                }
            }

            attempt += 1;
            if !handle.resume_step(index, attempt) {
                return StepOutcome::Cancelled;
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &ExecCtx,
        action: &ActionKind,
        params: &Map<String, Value>,
        target: Option<&Target>,
        budget: StepBudget,
    ) -> Result<Completed, Failure> {
        let step_timeout = budget.action;
        let host = self.waiter.host();
        let payload = Value::Object(params.clone());

        match action {
            ActionKind::Navigate => {
                let url = params
                    .get("url")
                    .and_then(Value::as_str)
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        ActionError::InvalidParameters("navigate requires `url`".to_string())
                    })?;
                with_deadline(step_timeout, "navigate", host.navigate(&ctx.session, url)).await?;
                self.waiter
                    .wait_for_navigation_settled(ctx, Some(budget.settle))
                    .await?;
                if params.get("wait_for_idle").and_then(Value::as_bool) == Some(true) {
                    self.waiter
                        .wait_for_network_idle(ctx, None, Some(step_timeout))
                        .await?;
                }
                Ok(Completed::plain(json!({ "url": url })))
            }

            ActionKind::Click => {
                let target = require_target(action, target)?;
                let resolved = self
                    .locate(ctx, target, wait_state(params, WaitState::Enabled), step_timeout)
                    .await?;
                let result = with_deadline(
                    step_timeout,
                    "click",
                    host.interact(&ctx.session, &resolved.selector, &Interaction::Click, &payload),
                )
                .await?;
                Ok(Completed::on(
                    &resolved,
                    json!({ "selector": resolved.selector, "result": result }),
                ))
            }

            ActionKind::Type => {
                let target = require_target(action, target)?;
                let text = match params.get("text") {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    _ => {
                        return Err(ActionError::InvalidParameters(
                            "type requires `text`".to_string(),
                        )
                        .into())
                    }
                };
                let resolved = self
                    .locate(ctx, target, wait_state(params, WaitState::Enabled), step_timeout)
                    .await?;
                let mut payload = params.clone();
                payload.insert("text".to_string(), Value::String(text.clone()));
                with_deadline(
                    step_timeout,
                    "type",
                    host.interact(
                        &ctx.session,
                        &resolved.selector,
                        &Interaction::Type,
                        &Value::Object(payload),
                    ),
                )
                .await?;
                Ok(Completed::on(
                    &resolved,
                    json!({ "selector": resolved.selector, "typed": text }),
                ))
            }

            ActionKind::Extract => {
                let target = require_target(action, target)?;
                let resolved = self
                    .locate(ctx, target, wait_state(params, WaitState::Visible), step_timeout)
                    .await?;
                let value = with_deadline(
                    step_timeout,
                    "extract",
                    host.interact(&ctx.session, &resolved.selector, &Interaction::Extract, &payload),
                )
                .await?;
                Ok(Completed::on(&resolved, value))
            }

            ActionKind::Wait => {
                if let Some(target) = target {
                    let state = wait_state(params, WaitState::Visible);
                    let resolved = self.locate(ctx, target, state, step_timeout).await?;
                    return Ok(Completed::on(
                        &resolved,
                        json!({ "selector": resolved.selector, "state": state }),
                    ));
                }
                if let Some(duration) = params.get("duration_ms") {
                    let ms = duration.as_u64().ok_or_else(|| {
                        ActionError::InvalidParameters(
                            "`duration_ms` must be a non-negative integer".to_string(),
                        )
                    })?;
                    self.waiter.pause(ctx, Duration::from_millis(ms)).await?;
                    return Ok(Completed::plain(json!({ "waited_ms": ms })));
                }
                let idle_window = params
                    .get("idle_ms")
                    .and_then(Value::as_u64)
                    .map(Duration::from_millis);
                let waited = self
                    .waiter
                    .wait_for_network_idle(ctx, idle_window, Some(step_timeout))
                    .await?;
                Ok(Completed::plain(
                    json!({ "network_idle_after_ms": waited.as_millis() as u64 }),
                ))
            }

            ActionKind::Screenshot => {
                let bytes =
                    with_deadline(step_timeout, "capture", host.capture(&ctx.session)).await?;
                let format = params
                    .get("format")
                    .and_then(Value::as_str)
                    .unwrap_or("png");
                Ok(Completed::plain(json!({
                    "format": format,
                    "bytes": bytes.len(),
                    "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
                })))
            }

            ActionKind::Custom(name) => {
                let Some(target) = target else {
                    return Err(ActionError::InvalidParameters(format!(
                        "action `{}` needs a target element",
                        name
                    ))
                    .into());
                };
                let resolved = self
                    .locate(ctx, target, wait_state(params, WaitState::Visible), step_timeout)
                    .await?;
                let result = with_deadline(
                    step_timeout,
                    name,
                    host.interact(
                        &ctx.session,
                        &resolved.selector,
                        &Interaction::Custom(name.clone()),
                        &payload,
                    ),
                )
                .await?;
                Ok(Completed::on(
                    &resolved,
                    json!({ "selector": resolved.selector, "result": result }),
                ))
            }
        }
    }

    async fn locate(
        &self,
        ctx: &ExecCtx,
        target: &Target,
        state: WaitState,
        budget: Duration,
    ) -> Result<Resolved, Failure> {
        self.locator
            .resolve(ctx, &target.selectors, state, budget)
            .await
            .map_err(|failure| Failure {
                selectors: failure.selectors(),
                error: failure.into_action_error(),
            })
    }
}

/// Selectors for a step: explicit ones first, else generated from the
/// descriptor. `Ok(None)` means the step names no element.
fn target_for(
    step: &Step,
    params: &Map<String, Value>,
    bag: &VariableBag,
) -> Result<Option<Target>, ActionError> {
    let descriptor = step.descriptor.clone().or_else(|| {
        params
            .get("descriptor")
            .and_then(|raw| serde_json::from_value::<ElementDescriptor>(raw.clone()).ok())
    });

    let mut explicit: Vec<String> = Vec::new();
    if let Some(selector) = params.get("selector").and_then(Value::as_str) {
        explicit.push(selector.to_string());
    }
    if let Some(recorded) = &step.selectors {
        let resolved = resolve(&json!(recorded), bag).value;
        if let Value::Array(items) = resolved {
            explicit.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }

    if !explicit.is_empty() {
        let selectors = SelectorSet::new(explicit)
            .map_err(|err| ActionError::InvalidParameters(err.to_string()))?;
        return Ok(Some(Target {
            selectors,
            descriptor,
        }));
    }

    Ok(descriptor.map(|descriptor| Target {
        selectors: generate(&descriptor),
        descriptor: Some(descriptor),
    }))
}

fn require_target<'a>(action: &ActionKind, target: Option<&'a Target>) -> Result<&'a Target, Failure> {
    target.ok_or_else(|| {
        ActionError::InvalidParameters(format!(
            "{} requires `parameters.selector`, `selectors` or `descriptor`",
            action
        ))
        .into()
    })
}

fn wait_state(params: &Map<String, Value>, default: WaitState) -> WaitState {
    params
        .get("state")
        .and_then(Value::as_str)
        .and_then(WaitState::parse)
        .unwrap_or(default)
}

async fn with_deadline<T, F>(budget: Duration, what: &str, call: F) -> Result<T, ActionError>
where
    F: Future<Output = Result<T, ActionError>>,
{
    match timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ActionError::Timeout(format!(
            "{} exceeded {}ms",
            what,
            budget.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::memory::{ElementSpec, MemoryHost, ANY_PAGE};
    use action_primitives::memory::ScriptedError;
    use action_primitives::Host;
    use network_tap_light::{NetworkMonitor, RequestOutcome};
    use soulflow_core_types::{ExecutionId, SessionId};
    use std::time::Instant;

    fn fast_wait() -> WaitConfig {
        WaitConfig {
            poll_interval_ms: 5,
            timeout_ms: 100,
            settle_timeout_ms: 200,
            idle_window_ms: 10,
            idle_timeout_ms: 200,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 5,
            max_delay_ms: 50,
            ..RetryPolicy::default()
        }
    }

    fn executor(host: Arc<MemoryHost>, policy: RetryPolicy) -> DefaultFlowExecutor {
        executor_on(host, Arc::new(NetworkMonitor::default()), fast_wait(), policy)
    }

    fn executor_on(
        host: Arc<MemoryHost>,
        monitor: Arc<NetworkMonitor>,
        wait: WaitConfig,
        policy: RetryPolicy,
    ) -> DefaultFlowExecutor {
        let waiter = AutoWait::new(host, monitor, wait);
        DefaultFlowExecutor::with_policy(Arc::new(waiter), policy)
    }

    fn handle_for(workflow: &WorkflowDefinition) -> ExecutionHandle {
        ExecutionHandle::new(ExecutionRecord::new(
            ExecutionId::new(),
            workflow,
            SessionId::from("exec-tests"),
        ))
    }

    fn checkout_button() -> ElementDescriptor {
        ElementDescriptor {
            tag: Some("button".into()),
            role: Some("button".into()),
            aria_label: Some("Pay now".into()),
            data_testid: Some("pay".into()),
            ..ElementDescriptor::default()
        }
    }

    #[tokio::test]
    async fn heals_click_after_two_misses() {
        let host = Arc::new(MemoryHost::new());
        host.add_element(
            "https://shop.test/checkout",
            ElementSpec::new([r#"[data-testid="pay"]"#]),
        );
        let workflow = WorkflowDefinition::new(vec![
            Step::new(ActionKind::Navigate).with_param("url", "https://shop.test/checkout"),
            Step::new(ActionKind::Click)
                .with_selectors(["#pay-legacy"])
                .with_descriptor(checkout_button())
                .with_timeout_ms(60),
            Step::new(ActionKind::Screenshot),
        ]);
        let handle = handle_for(&workflow);
        let policy = RetryPolicy {
            widen_step: 1,
            ..fast_policy()
        };

        executor(Arc::clone(&host), policy)
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.retry_counts, vec![0, 2, 0]);
        assert_eq!(record.steps[1].selector.as_deref(), Some(r#"[data-testid="pay"]"#));
        assert!(record.steps[1].healed);
        assert_eq!(record.outputs.len(), 3);

        let expected = base64::engine::general_purpose::STANDARD
            .encode("capture:https://shop.test/checkout");
        assert_eq!(record.outputs[2]["data"], json!(expected));
        assert_eq!(record.progress.completed, 3);
    }

    #[tokio::test]
    async fn persistent_not_actionable_fails_after_max_attempts() {
        let host = Arc::new(MemoryHost::new());
        host.add_element(ANY_PAGE, ElementSpec::new(["#buy"]).enabled(false));
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::Click)
            .with_param("selector", "#buy")
            .with_timeout_ms(30)]);
        let handle = handle_for(&workflow);

        executor(host, fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Failed);
        let error = record.last_error.unwrap();
        assert_eq!(error.category, FailureCategory::ElementNotActionable);
        assert_eq!(error.selectors, vec!["#buy"]);
        assert_eq!(record.retry_counts, vec![2]);
        assert_eq!(record.steps[0].attempts, 3);
    }

    #[tokio::test]
    async fn rejected_interaction_waits_for_traffic_before_retrying() {
        let host = Arc::new(MemoryHost::new());
        host.add_element(
            ANY_PAGE,
            ElementSpec::new(["#buy"]).failing(ScriptedError::NotActionable, None),
        );
        let monitor = Arc::new(NetworkMonitor::default());
        let pending = monitor.on_request_start("https://shop.test/api/cart", "POST");
        let finisher = Arc::clone(&monitor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            finisher.on_request_end(pending, Some(200), RequestOutcome::Succeeded);
        });

        let workflow = WorkflowDefinition::new(vec![
            Step::new(ActionKind::Click).with_param("selector", "#buy")
        ]);
        let handle = handle_for(&workflow);

        let started = Instant::now();
        executor_on(Arc::clone(&host), Arc::clone(&monitor), fast_wait(), fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(monitor.inflight(), 0);
        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.retry_counts, vec![2]);
        let error = record.last_error.unwrap();
        assert_eq!(error.category, FailureCategory::ElementNotActionable);
        assert!(error.message.contains("scripted failure"));
        let clicks = host
            .journal()
            .into_iter()
            .filter(|entry| entry.operation == "click")
            .count();
        assert_eq!(clicks, 3);
    }

    #[tokio::test]
    async fn step_timeout_covers_slow_navigation_settle() {
        let host = Arc::new(MemoryHost::new().with_ready_after(10));
        let wait = WaitConfig {
            settle_timeout_ms: 20,
            ..fast_wait()
        };
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::Navigate)
            .with_param("url", "https://shop.test/slow")
            .with_timeout_ms(2_000)]);
        let handle = handle_for(&workflow);

        executor_on(host, Arc::new(NetworkMonitor::default()), wait, fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.retry_counts, vec![0]);
    }

    #[tokio::test]
    async fn timeout_retries_grow_the_attempt_budget() {
        let host = Arc::new(MemoryHost::new().with_ready_after(u32::MAX));
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::Navigate)
            .with_param("url", "https://shop.test/stuck")
            .with_timeout_ms(20)]);
        let handle = handle_for(&workflow);
        let policy = RetryPolicy {
            timeout_growth: 2.0,
            ..fast_policy()
        };

        executor(host, policy)
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.retry_counts, vec![2]);
        let error = record.last_error.unwrap();
        assert_eq!(error.category, FailureCategory::Timeout);
        assert!(error.message.contains("within 80ms"), "{}", error.message);
    }

    #[tokio::test]
    async fn missing_parameters_fail_without_retry() {
        let host = Arc::new(MemoryHost::new());
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::Navigate)]);
        let handle = handle_for(&workflow);

        executor(Arc::clone(&host), fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.last_error.unwrap().category, FailureCategory::Generic);
        assert_eq!(record.retry_counts, vec![0]);
        assert!(host.journal().is_empty());
    }

    #[test]
    fn custom_action_without_target_is_rejected() {
        let host = Arc::new(MemoryHost::new());
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::from(
            "hover".to_string(),
        ))]);
        let handle = handle_for(&workflow);

        tokio_test::block_on(executor(Arc::clone(&host), fast_policy()).execute(
            &workflow,
            &handle,
            CancellationToken::new(),
        ));

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Failed);
        let error = record.last_error.unwrap();
        assert_eq!(error.category, FailureCategory::Generic);
        assert!(error.message.contains("hover"));
        assert!(host.journal().is_empty());
    }

    #[tokio::test]
    async fn extract_feeds_later_placeholders() {
        let host = Arc::new(MemoryHost::new());
        host.add_element(ANY_PAGE, ElementSpec::new(["#price"]).text("42.00"));
        host.add_element(ANY_PAGE, ElementSpec::new(["#note"]));
        let workflow = WorkflowDefinition::new(vec![
            Step::new(ActionKind::Extract)
                .with_param("selector", "#price")
                .with_param("store_as", "price"),
            Step::new(ActionKind::Type)
                .with_param("selector", "#note")
                .with_param("text", "paid {{price}} {{currency}}")
                .with_variable("currency", "EUR"),
        ]);
        let handle = handle_for(&workflow);

        executor(Arc::clone(&host), fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.variables["price"], json!("42.00"));
        assert_eq!(record.variables["step_0"], json!("42.00"));
        assert_eq!(record.outputs[1]["typed"], json!("paid 42.00 EUR"));

        let session = SessionId::from("exec-tests");
        let typed = host
            .interact(&session, "#note", &Interaction::Extract, &Value::Null)
            .await
            .unwrap();
        assert_eq!(typed, json!("paid 42.00 EUR"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_retry_delay() {
        let host = Arc::new(MemoryHost::new());
        let workflow = WorkflowDefinition::new(vec![Step::new(ActionKind::Click)
            .with_param("selector", "#never")
            .with_timeout_ms(10)]);
        let handle = handle_for(&workflow);
        let policy = RetryPolicy {
            base_delay_ms: 5_000,
            ..RetryPolicy::default()
        };

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        executor(host, policy).execute(&workflow, &handle, cancel).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Cancelled);
        assert_eq!(
            record.last_error.unwrap().category,
            FailureCategory::CancellationRequested
        );
    }

    #[tokio::test]
    async fn wait_step_without_target_pauses() {
        let host = Arc::new(MemoryHost::new());
        let workflow = WorkflowDefinition::new(vec![
            Step::new(ActionKind::Wait).with_param("duration_ms", 20),
            Step::new(ActionKind::Wait),
        ]);
        let handle = handle_for(&workflow);

        let started = Instant::now();
        executor(host, fast_policy())
            .execute(&workflow, &handle, CancellationToken::new())
            .await;

        assert!(started.elapsed() >= Duration::from_millis(20));
        let record = handle.snapshot();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.outputs[0], json!({ "waited_ms": 20 }));
    }
}
