use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use concord_core::error::SyncError;
use dashmap::DashMap;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info};

use crate::workflow::{WorkflowId, WorkflowState};

/// Signals a running workflow can react to between activities (§4.5
/// "signals/queries"). Workflows poll [`SignalReceiver`] at activity
/// boundaries; there is no preemption mid-activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Cancel,
}

pub type SignalReceiver = broadcast::Receiver<Signal>;

/// Runs workflows with two guarantees (§4.5):
///
/// 1. **Idempotent coalescing** — two triggers that compute the same
///    [`WorkflowId`] while the first is still running share one execution;
///    the second caller simply awaits the first's result instead of
///    duplicating work.
/// 2. **Queryable state** — [`WorkflowExecutor::state_of`] reports what a
///    workflow is doing without blocking on its completion.
pub struct WorkflowExecutor<T: Clone + Send + Sync + 'static> {
    inflight: DashMap<WorkflowId, Arc<OnceCell<Result<T, SyncError>>>>,
    states: DashMap<WorkflowId, WorkflowState>,
    signals: DashMap<WorkflowId, broadcast::Sender<Signal>>,
}

impl<T: Clone + Send + Sync + 'static> WorkflowExecutor<T> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
            states: DashMap::new(),
            signals: DashMap::new(),
        }
    }

    pub fn state_of(&self, id: &WorkflowId) -> Option<WorkflowState> {
        self.states.get(id).map(|s| *s)
    }

    /// Subscribe to cancellation-style signals sent to a specific workflow
    /// run. Must be called before or during the run to observe a later
    /// [`WorkflowExecutor::cancel`].
    pub fn subscribe(&self, id: &WorkflowId) -> SignalReceiver {
        self.signals
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(4).0)
            .subscribe()
    }

    /// Request cancellation of an in-flight workflow. A no-op if nothing is
    /// subscribed under that id.
    pub fn cancel(&self, id: &WorkflowId) {
        if let Some(tx) = self.signals.get(id) {
            let _ = tx.send(Signal::Cancel);
        }
    }

    /// Run `body`, coalescing concurrent callers with the same `id` onto a
    /// single execution. A failed run does not poison the id — the next
    /// caller starts fresh.
    pub async fn run<F, Fut>(&self, id: WorkflowId, body: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let cell = self
            .inflight
            .entry(id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        self.states.insert(id.clone(), WorkflowState::Running);
        debug!(workflow_id = %id, "workflow execution starting");

        let result = cell.get_or_try_init(body).await.cloned();

        self.inflight.remove(&id);
        self.signals.remove(&id);
        match &result {
            Ok(_) => {
                self.states.insert(id.clone(), WorkflowState::Completed);
                info!(workflow_id = %id, "workflow completed");
            }
            Err(_) => {
                self.states.insert(id.clone(), WorkflowState::Failed);
            }
        }
        result
    }

    /// Run `body` with a wall-clock timeout (§4.5 "cancellation/timeout"),
    /// surfaced as a retryable [`SyncError::Transient`] so the retry policy
    /// can decide whether to try again.
    pub async fn run_with_timeout<F, Fut>(
        &self,
        id: WorkflowId,
        timeout: Duration,
        body: F,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let id_for_body = id.clone();
        self.run(id, move || async move {
            match tokio::time::timeout(timeout, body()).await {
                Ok(result) => result,
                Err(_) => {
                    self.states.insert(id_for_body.clone(), WorkflowState::Failed);
                    Err(SyncError::Transient(format!(
                        "workflow {id_for_body} timed out after {timeout:?}"
                    )))
                }
            }
        })
        .await
    }
}

impl<T: Clone + Send + Sync + 'static> Default for WorkflowExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}
