use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::context::{QueryTable, WorkflowContext};
use super::{EngineError, RunHandle, StartOptions, WorkflowEngine};
use crate::models::{params::Params, timestamp};
use crate::workflows::{WorkflowDefinition, WorkflowRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRunStatus {
    /// Accepted but not yet picked up by a worker.
    Pending,
    Running,
    Completed,
    Failed,
}

impl EngineRunStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, EngineRunStatus::Pending | EngineRunStatus::Running)
    }
}

/// Engine-side view of a run, including the failure cause that workflows
/// report through their return value rather than through their result.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDescription {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub status: EngineRunStatus,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

struct RunEntry {
    run_id: Uuid,
    status: EngineRunStatus,
    error: Option<String>,
    result: Option<Value>,
    started_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    queries: Arc<QueryTable>,
}

pub(crate) struct QueuedRun {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub definition: Arc<dyn WorkflowDefinition>,
    pub params: Params,
    pub queries: Arc<QueryTable>,
}

/// In-process engine. Runs are scheduled on the tokio runtime by a worker
/// polling the engine's task queue; bookkeeping lives in memory only, so
/// nothing survives a restart. Starts are refused while no worker holds the
/// queue.
pub struct LocalEngine {
    registry: Arc<WorkflowRegistry>,
    task_queue: String,
    runs: DashMap<String, RunEntry>,
    queue_tx: mpsc::UnboundedSender<QueuedRun>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedRun>>>,
}

impl LocalEngine {
    pub fn new(registry: Arc<WorkflowRegistry>, task_queue: impl Into<String>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            task_queue: task_queue.into(),
            runs: DashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn describe_run(&self, workflow_id: &str) -> Option<RunDescription> {
        self.runs.get(workflow_id).map(|entry| RunDescription {
            workflow_id: workflow_id.to_string(),
            run_id: entry.run_id,
            status: entry.status,
            error: entry.error.clone(),
            result: entry.result.clone(),
            started_at: entry.started_at,
            closed_at: entry.closed_at,
        })
    }

    pub(crate) fn take_queue(&self) -> Result<mpsc::UnboundedReceiver<QueuedRun>, EngineError> {
        self.idle_queue()
            .take()
            .ok_or(EngineError::WorkerAlreadyRunning)
    }

    pub(crate) fn restore_queue(&self, rx: mpsc::UnboundedReceiver<QueuedRun>) {
        *self.idle_queue() = Some(rx);
    }

    /// The queue receiver while no worker holds it.
    fn idle_queue(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<QueuedRun>>> {
        self.queue_rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn context_for(&self, run: &QueuedRun) -> WorkflowContext {
        WorkflowContext::new(
            run.workflow_id.clone(),
            run.run_id,
            self.registry.clone(),
            run.queries.clone(),
        )
    }

    pub(crate) fn mark_running(&self, workflow_id: &str, run_id: Uuid) {
        if let Some(mut entry) = self.runs.get_mut(workflow_id) {
            if entry.run_id == run_id && entry.status == EngineRunStatus::Pending {
                entry.status = EngineRunStatus::Running;
            }
        }
    }

    pub(crate) fn close_run(
        &self,
        workflow_id: &str,
        run_id: Uuid,
        outcome: Result<Value, String>,
    ) {
        let Some(mut entry) = self.runs.get_mut(workflow_id) else {
            warn!(%workflow_id, %run_id, "closing a run the engine no longer tracks");
            return;
        };
        if entry.run_id != run_id {
            warn!(%workflow_id, %run_id, current = %entry.run_id, "stale run finished");
            return;
        }
        entry.closed_at = Some(timestamp::now());
        match outcome {
            Ok(result) => {
                entry.status = EngineRunStatus::Completed;
                entry.result = Some(result);
            }
            Err(err) => {
                entry.status = EngineRunStatus::Failed;
                entry.error = Some(err);
            }
        }
    }
}

#[async_trait]
impl WorkflowEngine for LocalEngine {
    async fn start_run(
        &self,
        options: StartOptions,
        definition: Arc<dyn WorkflowDefinition>,
        params: Params,
    ) -> Result<RunHandle, EngineError> {
        if options.task_queue != self.task_queue {
            return Err(EngineError::UnknownTaskQueue(options.task_queue));
        }
        if self.registry.resolve(definition.name()).is_none() {
            return Err(EngineError::UnregisteredWorkflow(definition.name().to_string()));
        }
        // Held until the run is enqueued so a worker cannot detach in between.
        let idle = self.idle_queue();
        if idle.is_some() {
            warn!(workflow_id = %options.workflow_id, task_queue = %self.task_queue, "start refused, no worker polling");
            return Err(EngineError::Unavailable(format!(
                "no worker is polling task queue {}",
                self.task_queue
            )));
        }

        let run_id = Uuid::new_v4();
        let queries = Arc::new(QueryTable::new());
        let entry = RunEntry {
            run_id,
            status: EngineRunStatus::Pending,
            error: None,
            result: None,
            started_at: timestamp::now(),
            closed_at: None,
            queries: queries.clone(),
        };

        match self.runs.entry(options.workflow_id.clone()) {
            Entry::Occupied(existing) if existing.get().status.is_open() => {
                return Err(EngineError::AlreadyStarted {
                    workflow_id: options.workflow_id,
                    run_id: existing.get().run_id,
                });
            }
            Entry::Occupied(mut closed) => {
                closed.insert(entry);
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }

        let queued = QueuedRun {
            workflow_id: options.workflow_id.clone(),
            run_id,
            definition,
            params,
            queries,
        };
        if self.queue_tx.send(queued).is_err() {
            self.runs.remove(&options.workflow_id);
            return Err(EngineError::Unavailable("task queue closed".to_string()));
        }
        drop(idle);

        info!(workflow_id = %options.workflow_id, %run_id, task_queue = %self.task_queue, "run enqueued");
        Ok(RunHandle {
            workflow_id: options.workflow_id,
            run_id,
        })
    }

    async fn query_run(
        &self,
        workflow_id: &str,
        query_name: &str,
    ) -> Result<Option<Value>, EngineError> {
        let handler = {
            let entry = self
                .runs
                .get(workflow_id)
                .ok_or_else(|| EngineError::RunNotFound {
                    workflow_id: workflow_id.to_string(),
                })?;
            let handler = entry.queries.get(query_name).map(|h| h.value().clone());
            match handler {
                Some(handler) => handler,
                None if entry.status.is_open() => return Ok(None),
                None => {
                    return Err(EngineError::QueryHandlerMissing {
                        workflow_id: workflow_id.to_string(),
                        query: query_name.to_string(),
                    })
                }
            }
        };

        handler()
            .map(Some)
            .map_err(|err| EngineError::QueryFailed {
                query: query_name.to_string(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::STATE_QUERY;
    use crate::models::run_result::{RunStatus, WorkflowRunResult};
    use crate::workflows::WorkflowError;
    use serde_json::json;

    struct Idle;

    #[async_trait]
    impl WorkflowDefinition for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn run(
            &self,
            ctx: WorkflowContext,
            _params: Params,
        ) -> Result<WorkflowRunResult, WorkflowError> {
            Ok(WorkflowRunResult::new(RunStatus::Completed, "", ctx.now()))
        }
    }

    type Queue = mpsc::UnboundedReceiver<QueuedRun>;

    fn idle_engine() -> LocalEngine {
        let registry = WorkflowRegistry::builder()
            .register_workflow(Idle)
            .unwrap()
            .build();
        LocalEngine::new(Arc::new(registry), "dispatch")
    }

    /// An engine whose queue is held as if a worker were polling it.
    fn engine() -> (LocalEngine, Queue) {
        let engine = idle_engine();
        let queue = engine.take_queue().unwrap();
        (engine, queue)
    }

    fn options(id: &str) -> StartOptions {
        StartOptions {
            workflow_id: id.to_string(),
            task_queue: "dispatch".to_string(),
        }
    }

    #[tokio::test]
    async fn open_run_blocks_second_start() {
        let (engine, _queue) = engine();
        let first = engine
            .start_run(options("idle-1"), Arc::new(Idle), Params::new())
            .await
            .unwrap();

        let err = engine
            .start_run(options("idle-1"), Arc::new(Idle), Params::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::AlreadyStarted {
                workflow_id: "idle-1".into(),
                run_id: first.run_id,
            }
        );
        assert_eq!(
            engine.describe_run("idle-1").unwrap().status,
            EngineRunStatus::Pending
        );
    }

    #[tokio::test]
    async fn closed_run_can_be_started_again() {
        let (engine, _queue) = engine();
        let first = engine
            .start_run(options("idle-2"), Arc::new(Idle), Params::new())
            .await
            .unwrap();
        engine.close_run("idle-2", first.run_id, Ok(json!({})));

        let second = engine
            .start_run(options("idle-2"), Arc::new(Idle), Params::new())
            .await
            .unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(engine.describe_run("idle-2").unwrap().run_id, second.run_id);
    }

    #[tokio::test]
    async fn rejects_foreign_task_queue_and_unregistered_workflows() {
        let (engine, _queue) = engine();
        let err = engine
            .start_run(
                StartOptions {
                    workflow_id: "idle".into(),
                    task_queue: "elsewhere".into(),
                },
                Arc::new(Idle),
                Params::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownTaskQueue("elsewhere".into()));

        let bare = LocalEngine::new(Arc::new(WorkflowRegistry::builder().build()), "dispatch");
        let _bare_queue = bare.take_queue().unwrap();
        let err = bare
            .start_run(options("idle"), Arc::new(Idle), Params::new())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnregisteredWorkflow("idle".into()));
    }

    #[tokio::test]
    async fn query_distinguishes_missing_runs_and_pending_handlers() {
        let (engine, _queue) = engine();
        let err = engine.query_run("nope", STATE_QUERY).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::RunNotFound {
                workflow_id: "nope".into()
            }
        );

        let handle = engine
            .start_run(options("idle-3"), Arc::new(Idle), Params::new())
            .await
            .unwrap();
        assert_eq!(engine.query_run("idle-3", STATE_QUERY).await.unwrap(), None);

        engine.close_run("idle-3", handle.run_id, Err("boom".into()));
        let err = engine.query_run("idle-3", STATE_QUERY).await.unwrap_err();
        assert!(matches!(err, EngineError::QueryHandlerMissing { .. }));
        assert_eq!(
            engine.describe_run("idle-3").unwrap().error.as_deref(),
            Some("boom")
        );
    }

    #[tokio::test]
    async fn stale_close_is_ignored() {
        let (engine, _queue) = engine();
        let handle = engine
            .start_run(options("idle-4"), Arc::new(Idle), Params::new())
            .await
            .unwrap();
        engine.close_run("idle-4", Uuid::new_v4(), Ok(json!({})));
        let description = engine.describe_run("idle-4").unwrap();
        assert_eq!(description.run_id, handle.run_id);
        assert_eq!(description.status, EngineRunStatus::Pending);
    }

    #[tokio::test]
    async fn start_is_refused_while_no_worker_polls() {
        let engine = idle_engine();
        let err = engine
            .start_run(options("idle-5"), Arc::new(Idle), Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(engine.describe_run("idle-5").is_none());

        let queue = engine.take_queue().unwrap();
        engine
            .start_run(options("idle-5"), Arc::new(Idle), Params::new())
            .await
            .unwrap();

        engine.restore_queue(queue);
        let err = engine
            .start_run(options("idle-6"), Arc::new(Idle), Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(engine.describe_run("idle-6").is_none());
    }

    #[test]
    fn queue_can_be_held_by_one_worker_at_a_time() {
        let engine = idle_engine();
        let queue = engine.take_queue().unwrap();
        assert_eq!(engine.take_queue().err(), Some(EngineError::WorkerAlreadyRunning));
        engine.restore_queue(queue);
        assert!(engine.take_queue().is_ok());
    }
}
