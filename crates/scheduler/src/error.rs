use soulflow_core_types::ExecutionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown execution {0}")]
    UnknownExecution(ExecutionId),
    #[error("execution {0} still running after {1}ms")]
    WaitTimedOut(ExecutionId, u64),
}

