use action_flow::{ExecutionRecord, ExecutionStatus};
use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounter, IntCounterVec, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref EXECUTIONS_SUBMITTED: IntCounter = IntCounter::new(
        "soulflow_executions_submitted_total",
        "Executions accepted by submit"
    )
    .expect("valid metric");
    static ref EXECUTIONS_FINISHED: IntCounterVec = IntCounterVec::new(
        opts!(
            "soulflow_executions_finished_total",
            "Executions reaching a terminal status grouped by status"
        ),
        &["status"]
    )
    .expect("valid metric");
    static ref STEP_RETRIES: IntCounter = IntCounter::new(
        "soulflow_step_retries_total",
        "Step retries taken across all executions"
    )
    .expect("valid metric");
    static ref EXECUTIONS_ACTIVE: IntGauge = IntGauge::new(
        "soulflow_executions_active",
        "Executions holding a concurrency slot"
    )
    .expect("valid metric");
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register scheduler metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, EXECUTIONS_SUBMITTED.clone());
    register(registry, EXECUTIONS_FINISHED.clone());
    register(registry, STEP_RETRIES.clone());
    register(registry, EXECUTIONS_ACTIVE.clone());
}

pub fn record_submitted() {
    EXECUTIONS_SUBMITTED.inc();
}

pub fn record_started() {
    EXECUTIONS_ACTIVE.inc();
}

pub fn record_released() {
    EXECUTIONS_ACTIVE.dec();
}

/// Count a terminal record once its task is done with it.
pub fn record_finished(record: &ExecutionRecord) {
    if !record.status.is_terminal() {
        return;
    }
    EXECUTIONS_FINISHED
        .with_label_values(&[record.status.as_str()])
        .inc();
    STEP_RETRIES.inc_by(u64::from(record.total_retries()));
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionCounters {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub active: i64,
}

pub fn snapshot() -> ExecutionCounters {
    let finished = |status: ExecutionStatus| {
        EXECUTIONS_FINISHED
            .with_label_values(&[status.as_str()])
            .get()
    };
    ExecutionCounters {
        submitted: EXECUTIONS_SUBMITTED.get(),
        succeeded: finished(ExecutionStatus::Succeeded),
        failed: finished(ExecutionStatus::Failed),
        cancelled: finished(ExecutionStatus::Cancelled),
        retries: STEP_RETRIES.get(),
        active: EXECUTIONS_ACTIVE.get(),
    }
}
