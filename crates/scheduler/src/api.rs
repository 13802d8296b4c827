use std::sync::Arc;
use std::time::Duration;

use action_flow::{
    ExecutionHandle, ExecutionRecord, ExecutionStatus, FailureCategory, FlowExecutor, StepError,
    WorkflowDefinition,
};
use async_trait::async_trait;
use soulflow_core_types::{ExecutionId, SessionId};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::metrics;
use crate::model::{EngineConfig, ServiceLoad};
use crate::runtime::{ExecutionEntry, ExecutionRegistry};

/// Caller-facing surface of the engine. None of these calls fail; problems
/// are reported through the execution record.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, workflow: WorkflowDefinition, session: SessionId) -> ExecutionId;
    async fn get_status(&self, id: &ExecutionId) -> Option<ExecutionRecord>;
    async fn cancel(&self, id: &ExecutionId) -> bool;
}

/// Registry of executions plus the bounded pool running them.
pub struct ExecutionService {
    executor: Arc<dyn FlowExecutor>,
    registry: Arc<ExecutionRegistry>,
    slots: Arc<Semaphore>,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl ExecutionService {
    pub fn new(executor: Arc<dyn FlowExecutor>, config: EngineConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            executor,
            registry: Arc::new(ExecutionRegistry::new()),
            slots,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new execution and start driving it in the background.
    ///
    /// A workflow without steps is marked `Succeeded` before this returns.
    /// Called outside a tokio runtime, the execution is recorded as `Failed`.
    pub fn submit(&self, workflow: WorkflowDefinition, session: SessionId) -> ExecutionId {
        let id = ExecutionId::new();
        let handle = ExecutionHandle::new(ExecutionRecord::new(id.clone(), &workflow, session));
        let cancel = self.shutdown.child_token();
        let entry = Arc::new(ExecutionEntry::new(handle.clone(), cancel.clone()));
        self.registry.insert(Arc::clone(&entry));
        metrics::record_submitted();

        if workflow.steps.is_empty() {
            handle.transition(ExecutionStatus::Running);
            handle.succeed();
            entry.mark_done();
            metrics::record_finished(&handle.snapshot());
            info!(execution_id = %id, "empty workflow succeeded");
            return id;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(execution_id = %id, error = %err, "submit outside a tokio runtime");
                handle.transition(ExecutionStatus::Running);
                handle.fail_step(
                    0,
                    StepError::new(
                        FailureCategory::Generic,
                        format!("no async runtime to drive the execution: {}", err),
                    ),
                );
                entry.mark_done();
                metrics::record_finished(&handle.snapshot());
                return id;
            }
        };

        debug!(
            execution_id = %id,
            steps = workflow.steps.len(),
            available_slots = self.slots.available_permits(),
            "execution queued"
        );
        let executor = Arc::clone(&self.executor);
        let slots = Arc::clone(&self.slots);
        let task_entry = Arc::clone(&entry);
        let task = runtime.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = slots.acquire_owned() => permit.ok(),
            };
            match permit {
                Some(_permit) => {
                    metrics::record_started();
                    executor.execute(&workflow, task_entry.handle(), cancel).await;
                    metrics::record_released();
                }
                None => {
                    task_entry.handle().cancel("cancelled before start");
                }
            }
            metrics::record_finished(&task_entry.handle().snapshot());
            task_entry.mark_done();
        });
        entry.attach(task);
        id
    }

    pub fn get_status(&self, id: &ExecutionId) -> Option<ExecutionRecord> {
        self.registry.get(id).map(|entry| entry.handle().snapshot())
    }

    /// Request cancellation. `true` only for the call that moved a live
    /// execution to `Cancelled`.
    pub fn cancel(&self, id: &ExecutionId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            debug!(execution_id = %id, "cancel for unknown execution");
            return false;
        };
        if !entry.handle().cancel("cancelled by caller") {
            return false;
        }
        entry.token().cancel();
        info!(execution_id = %id, "execution cancelled");
        true
    }

    pub fn list(&self) -> Vec<ExecutionRecord> {
        self.registry.snapshots()
    }

    pub fn load(&self) -> ServiceLoad {
        ServiceLoad {
            tracked: self.registry.len(),
            running: self.registry.running(),
            available_slots: self.slots.available_permits(),
        }
    }

    /// Wait until the execution's task has finished with its record.
    pub async fn wait_for_completion(
        &self,
        id: &ExecutionId,
        timeout: Duration,
    ) -> Result<ExecutionRecord, SchedulerError> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownExecution(id.clone()))?;
        let mut done = entry.subscribe();
        let result = match tokio::time::timeout(timeout, done.wait_for(|finished| *finished)).await {
            Ok(_) => Ok(entry.handle().snapshot()),
            Err(_) => Err(SchedulerError::WaitTimedOut(
                id.clone(),
                timeout.as_millis() as u64,
            )),
        };
        result
    }

    /// Forget executions that reached a terminal status.
    pub fn purge_finished(&self) -> usize {
        self.registry.purge_finished()
    }

    /// Cancel everything still live.
    pub fn shutdown(&self) -> usize {
        let mut cancelled = 0;
        for (id, handle, token) in self.registry.tokens() {
            if handle.cancel("engine shutdown") {
                cancelled += 1;
                debug!(execution_id = %id, "cancelled on shutdown");
            }
            token.cancel();
        }
        self.shutdown.cancel();
        cancelled
    }
}

#[async_trait]
impl Dispatcher for ExecutionService {
    async fn submit(&self, workflow: WorkflowDefinition, session: SessionId) -> ExecutionId {
        ExecutionService::submit(self, workflow, session)
    }

    async fn get_status(&self, id: &ExecutionId) -> Option<ExecutionRecord> {
        ExecutionService::get_status(self, id)
    }

    async fn cancel(&self, id: &ExecutionId) -> bool {
        ExecutionService::cancel(self, id)
    }
}

#[async_trait]
impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    async fn submit(&self, workflow: WorkflowDefinition, session: SessionId) -> ExecutionId {
        (**self).submit(workflow, session).await
    }

    async fn get_status(&self, id: &ExecutionId) -> Option<ExecutionRecord> {
        (**self).get_status(id).await
    }

    async fn cancel(&self, id: &ExecutionId) -> bool {
        (**self).cancel(id).await
    }
}
