//! # Queued Job Runtime
//!
//! In-process [`JobRuntime`]: executions are queued on a tokio channel and
//! run by a background [`JobWorker`].
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Queued Job Runtime                                 │
//! │                                                                         │
//! │  dispatcher                                                             │
//! │     │ new_execution / add_pending_items / add_with_descendants          │
//! │     │ submit(execution, configurator)                                   │
//! │     ▼                                                                   │
//! │  ┌──────────────────┐  bounded mpsc     ┌──────────────────┐           │
//! │  │ QueuedJobRuntime │ ────────────────► │    JobWorker     │           │
//! │  │  (returns id     │                   │  configure()     │           │
//! │  │   immediately)   │                   │  mark finished   │           │
//! │  └────────┬─────────┘                   │  count per rule  │           │
//! │           │                             └────────┬─────────┘           │
//! │           └──────────── shared RuntimeState ◄────┘                     │
//! │                                                                         │
//! │  A full queue rejects with CoreError::JobRejected.                      │
//! │  JobWorkerHandle::shutdown() stops the worker; later submissions fail  │
//! │  with CoreError::RuntimeStopped.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use catsync_core::{
    AccessContext, CompletionInfo, CoreError, CoreResult, Execution, ExecutionConfigurator,
    ExecutionId, ExecutionKind, ItemKey, JobRuntime, PendingItem, RuleId, SyncRule,
};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Shared State
// =============================================================================

/// One call to [`JobRuntime::add_with_descendants`], kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantCall {
    pub rule: RuleId,
    pub roots: Vec<ItemKey>,

    /// Whether restrictions were disabled while the call ran.
    pub restrictions_disabled: bool,
}

#[derive(Debug, Default)]
struct RuntimeState {
    submissions: Vec<Execution>,
    progress: HashMap<ExecutionId, CompletionInfo>,
    completed: HashMap<RuleId, usize>,
    descendant_calls: Vec<DescendantCall>,
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<RwLock<RuntimeState>>);

impl SharedState {
    fn read(&self) -> RwLockReadGuard<'_, RuntimeState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuntimeState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

struct QueuedExecution {
    execution: Execution,
    configurator: Box<dyn ExecutionConfigurator>,
}

// =============================================================================
// Runtime
// =============================================================================

/// Queue capacity used by [`QueuedJobRuntime::new`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// [`JobRuntime`] that hands executions to a [`JobWorker`].
pub struct QueuedJobRuntime {
    kind: ExecutionKind,
    state: SharedState,
    queue_tx: mpsc::Sender<QueuedExecution>,
    capacity: usize,
}

/// Handle for controlling the job worker.
#[derive(Clone)]
pub struct JobWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl JobWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> StoreResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| StoreError::ChannelClosed("Shutdown channel closed".into()))
    }
}

impl QueuedJobRuntime {
    /// Creates the runtime, its worker and the worker's handle.
    ///
    /// `kind` is the execution flavour handed out for every rule.
    pub fn new(kind: ExecutionKind) -> (Self, JobWorker, JobWorkerHandle) {
        Self::with_capacity(kind, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`QueuedJobRuntime::new`], with at most `capacity` executions
    /// waiting for the worker. Submissions beyond that are rejected.
    pub fn with_capacity(
        kind: ExecutionKind,
        capacity: usize,
    ) -> (Self, JobWorker, JobWorkerHandle) {
        let capacity = capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = SharedState::default();

        let runtime = QueuedJobRuntime {
            kind,
            state: state.clone(),
            queue_tx,
            capacity,
        };
        let worker = JobWorker {
            state,
            queue_rx,
            shutdown_rx,
        };

        (runtime, worker, JobWorkerHandle { shutdown_tx })
    }

    /// Records `count` earlier completed executions of a rule.
    pub fn record_completed(&self, rule: impl Into<RuleId>, count: usize) {
        *self.state.write().completed.entry(rule.into()).or_default() += count;
    }

    /// Snapshot of every submitted execution, in submission order.
    pub fn submissions(&self) -> Vec<Execution> {
        self.state.read().submissions.clone()
    }

    /// Snapshot of the hierarchical expansion calls made so far.
    pub fn descendant_calls(&self) -> Vec<DescendantCall> {
        self.state.read().descendant_calls.clone()
    }
}

impl JobRuntime for QueuedJobRuntime {
    fn new_execution(&self, rule: &SyncRule) -> Execution {
        Execution::new(rule.id.clone(), self.kind)
    }

    fn add_pending_items(&self, execution: &mut Execution, items: Vec<PendingItem>) {
        for item in items {
            if !execution.pending.contains(&item) {
                execution.pending.push(item);
            }
        }
    }

    fn add_pending_items_versioned(&self, execution: &mut Execution, items: Vec<PendingItem>) {
        if execution.kind != ExecutionKind::VersionSync {
            warn!(execution = %execution.id, "Bulk pending items on a generic execution");
        }
        execution.pending.extend(items);
        execution.pending.dedup();
    }

    fn add_with_descendants(
        &self,
        execution: &mut Execution,
        roots: Vec<ItemKey>,
        ctx: &AccessContext,
    ) {
        self.state.write().descendant_calls.push(DescendantCall {
            rule: execution.rule.clone(),
            roots: roots.clone(),
            restrictions_disabled: ctx.restrictions_disabled(),
        });
        execution.hierarchical_roots.extend(roots);
        execution.include_descendants = true;
    }

    fn submit(
        &self,
        execution: Execution,
        configurator: Box<dyn ExecutionConfigurator>,
    ) -> CoreResult<ExecutionId> {
        let id = execution.id;

        // Progress must exist before the worker can mark it finished.
        let mut state = self.state.write();
        state.submissions.push(execution.clone());
        state.progress.insert(id, CompletionInfo::default());

        let queued = QueuedExecution {
            execution,
            configurator,
        };
        if let Err(err) = self.queue_tx.try_send(queued) {
            state.submissions.pop();
            state.progress.remove(&id);
            return Err(match err {
                TrySendError::Full(_) => {
                    warn!(execution = %id, capacity = self.capacity, "Job queue full");
                    CoreError::JobRejected(format!("queue full ({} waiting)", self.capacity))
                }
                TrySendError::Closed(_) => CoreError::RuntimeStopped,
            });
        }
        drop(state);

        debug!(execution = %id, "Execution queued");
        Ok(id)
    }

    fn completion_info(&self, execution: ExecutionId) -> Option<CompletionInfo> {
        self.state.read().progress.get(&execution).copied()
    }

    fn completed_executions(&self, rule: &RuleId) -> usize {
        self.state.read().completed.get(rule).copied().unwrap_or(0)
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Runs queued executions.
pub struct JobWorker {
    state: SharedState,
    queue_rx: mpsc::Receiver<QueuedExecution>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl JobWorker {
    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Job worker starting");

        loop {
            tokio::select! {
                queued = self.queue_rx.recv() => match queued {
                    Some(queued) => self.execute(queued),
                    None => break,
                },

                _ = self.shutdown_rx.recv() => {
                    info!("Job worker shutting down");
                    break;
                }
            }
        }

        info!("Job worker stopped");
    }

    /// Runs everything queued so far without waiting for more.
    pub fn drain(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(queued) = self.queue_rx.try_recv() {
            self.execute(queued);
            executed += 1;
        }
        executed
    }

    fn execute(&self, queued: QueuedExecution) {
        let QueuedExecution {
            execution,
            configurator,
        } = queued;

        configurator.configure(&execution);

        let items_done = execution.pending.len() + execution.hierarchical_roots.len();
        let mut state = self.state.write();
        state.progress.insert(
            execution.id,
            CompletionInfo {
                finished: true,
                items_done,
                items_failed: 0,
            },
        );
        *state.completed.entry(execution.rule.clone()).or_default() += 1;

        info!(
            execution = %execution.id,
            rule = %execution.rule,
            items = items_done,
            full_run = execution.is_full_run(),
            "Execution finished"
        );
    }
}
