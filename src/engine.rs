//! Wiring from configuration to a running execution service

use std::sync::Arc;
use std::time::Duration;

use action_flow::{DefaultFlowExecutor, ExecutionRecord, WorkflowDefinition};
use action_primitives::{AutoWait, Host};
use network_tap_light::NetworkMonitor;
use soulflow_core_types::{ExecutionId, SessionId};
use soulflow_scheduler::{ExecutionService, SchedulerError};

use crate::config::Config;

/// One engine instance: a monitor, the waiter built over it and the service
/// that runs executions against the host.
pub struct Engine {
    monitor: Arc<NetworkMonitor>,
    waiter: Arc<AutoWait>,
    service: Arc<ExecutionService>,
}

impl Engine {
    /// Monitor sized from `config`, for hosts that need it at construction.
    pub fn monitor_for(config: &Config) -> Arc<NetworkMonitor> {
        Arc::new(NetworkMonitor::new(config.network.tap_config(&config.wait)))
    }

    pub fn new(config: &Config, host: Arc<dyn Host>, monitor: Arc<NetworkMonitor>) -> Self {
        let waiter = Arc::new(AutoWait::new(
            host,
            Arc::clone(&monitor),
            config.wait.clone(),
        ));
        let executor = Arc::new(DefaultFlowExecutor::with_policy(
            Arc::clone(&waiter),
            config.retry.clone(),
        ));
        let service = Arc::new(ExecutionService::new(executor, config.engine.clone()));
        Self {
            monitor,
            waiter,
            service,
        }
    }

    pub fn service(&self) -> &Arc<ExecutionService> {
        &self.service
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub fn waiter(&self) -> &Arc<AutoWait> {
        &self.waiter
    }

    pub fn submit(&self, workflow: WorkflowDefinition, session: SessionId) -> ExecutionId {
        self.service.submit(workflow, session)
    }

    /// Submit and wait for the terminal record.
    pub async fn run(
        &self,
        workflow: WorkflowDefinition,
        session: SessionId,
        timeout: Duration,
    ) -> Result<ExecutionRecord, SchedulerError> {
        let id = self.submit(workflow, session);
        self.service.wait_for_completion(&id, timeout).await
    }
}
