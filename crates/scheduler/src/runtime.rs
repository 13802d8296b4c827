use std::sync::Arc;

use action_flow::{ExecutionHandle, ExecutionRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use soulflow_core_types::ExecutionId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One tracked execution: its record, its cancellation token and the task
/// driving it.
#[derive(Debug)]
pub struct ExecutionEntry {
    handle: ExecutionHandle,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionEntry {
    pub fn new(handle: ExecutionHandle, cancel: CancellationToken) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            handle,
            cancel,
            done,
            task: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Signal that no task touches the record anymore.
    pub fn mark_done(&self) {
        self.done.send_replace(true);
        self.task.lock().take();
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    entries: DashMap<ExecutionId, Arc<ExecutionEntry>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Arc<ExecutionEntry>) -> ExecutionId {
        let id = entry.handle().id();
        self.entries.insert(id.clone(), entry);
        id
    }

    pub fn get(&self, id: &ExecutionId) -> Option<Arc<ExecutionEntry>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose task has not finished yet.
    pub fn running(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_done()).count()
    }

    pub fn snapshots(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .entries
            .iter()
            .map(|entry| entry.handle().snapshot())
            .collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    pub fn tokens(&self) -> Vec<(ExecutionId, ExecutionHandle, CancellationToken)> {
        self.entries
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.handle().clone(),
                    entry.token().clone(),
                )
            })
            .collect()
    }

    /// Drop finished executions, returning how many were removed.
    pub fn purge_finished(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.is_done() && entry.handle().status().is_terminal()));
        before.saturating_sub(self.entries.len())
    }
}
