mod context;
mod local;
#[cfg(test)]
pub(crate) mod mock_engine;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::params::Params;
use crate::workflows::WorkflowDefinition;

pub use context::{ActivityOptions, WorkflowContext};
pub use local::{EngineRunStatus, LocalEngine, RunDescription};
pub(crate) use context::QueryTable;
pub(crate) use local::QueuedRun;

/// Query name every workflow answers with its current result.
pub const STATE_QUERY: &str = "state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub workflow_id: String,
    pub task_queue: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub workflow_id: String,
    pub run_id: Uuid,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no run found for workflow id {workflow_id}")]
    RunNotFound { workflow_id: String },
    #[error("workflow id {workflow_id} is already running as run {run_id}")]
    AlreadyStarted { workflow_id: String, run_id: Uuid },
    #[error("no worker serves task queue {0}")]
    UnknownTaskQueue(String),
    #[error("workflow type {0} is not registered with the engine")]
    UnregisteredWorkflow(String),
    #[error("query handler name must not be empty")]
    InvalidQueryName,
    #[error("query handler {0} is already installed")]
    DuplicateQueryHandler(String),
    #[error("run {workflow_id} has no handler for query {query}")]
    QueryHandlerMissing { workflow_id: String, query: String },
    #[error("query {query} failed: {message}")]
    QueryFailed { query: String, message: String },
    #[error("a worker is already polling this engine")]
    WorkerAlreadyRunning,
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// The start/query surface of a workflow execution engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Schedules `definition` under `options.workflow_id` without waiting
    /// for it to make progress.
    async fn start_run(
        &self,
        options: StartOptions,
        definition: Arc<dyn WorkflowDefinition>,
        params: Params,
    ) -> Result<RunHandle, EngineError>;

    /// Asks the run's query handler for its current answer. `Ok(None)` means
    /// the run exists but has not installed the handler yet.
    async fn query_run(&self, workflow_id: &str, query_name: &str)
        -> Result<Option<Value>, EngineError>;
}
