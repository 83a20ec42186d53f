mod identity;

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::{EngineError, StartOptions, WorkflowEngine, STATE_QUERY};
use crate::models::params::Params;
use crate::models::run_result::{RunStatus, WorkflowRunResult};
use crate::models::timestamp;
use crate::workflows::{random_dog, random_unsplash, WorkflowRegistry};

pub use identity::RunIdentity;

/// Weblink for accepted runs of types without a dedicated page, and for
/// runs that have not reported any state yet.
pub const GENERIC_WEBLINK: &str = "https://google.com/";

pub fn weblink_for(workflow_type: &str) -> &'static str {
    match workflow_type {
        random_dog::NAME => random_dog::WEBLINK,
        random_unsplash::NAME => random_unsplash::WEBLINK,
        _ => GENERIC_WEBLINK,
    }
}

/// What a query does with engine or decode failures other than "no such
/// run".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryErrorPolicy {
    /// Log the failure and report the run as not found.
    #[default]
    NotFound,
    /// Return the failure to the caller.
    Propagate,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("run state could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Starts and queries workflow runs on behalf of callers. Holds no per-run
/// state; everything observable lives in the engine.
#[derive(Clone)]
pub struct DispatchClient {
    registry: Arc<WorkflowRegistry>,
    engine: Arc<dyn WorkflowEngine>,
    task_queue: String,
    query_errors: QueryErrorPolicy,
}

impl DispatchClient {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        engine: Arc<dyn WorkflowEngine>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            engine,
            task_queue: task_queue.into(),
            query_errors: QueryErrorPolicy::default(),
        }
    }

    pub fn with_query_errors(mut self, policy: QueryErrorPolicy) -> Self {
        self.query_errors = policy;
        self
    }

    /// Starts `workflow_type` without waiting for it. An unregistered type
    /// is answered with a `Failed` result and never reaches the engine.
    pub async fn start(
        &self,
        workflow_type: &str,
        params: Params,
    ) -> Result<WorkflowRunResult, DispatchError> {
        let now = timestamp::now();
        let Some(definition) = self.registry.resolve(workflow_type) else {
            warn!(workflow_type, "start requested for unregistered workflow type");
            return Ok(WorkflowRunResult::new(RunStatus::Failed, "", now));
        };

        let identity = RunIdentity::for_start(workflow_type, &params);
        let options = StartOptions {
            workflow_id: identity.to_string(),
            task_queue: self.task_queue.clone(),
        };
        match self.engine.start_run(options, definition, params).await {
            Ok(handle) => {
                info!(%identity, run_id = %handle.run_id, "workflow run started");
                Ok(WorkflowRunResult::new(
                    RunStatus::Created,
                    weblink_for(workflow_type),
                    now,
                ))
            }
            Err(err) => {
                error!(%identity, ?err, "failed to start workflow run");
                Err(err.into())
            }
        }
    }

    /// Current state of the run identified by `workflow_type` and
    /// `instance_id`. `Ok(None)` means the run is unknown.
    pub async fn query(
        &self,
        workflow_type: &str,
        instance_id: &str,
    ) -> Result<Option<WorkflowRunResult>, DispatchError> {
        let identity = RunIdentity::for_query(workflow_type, instance_id);
        let outcome = match self.engine.query_run(identity.as_str(), STATE_QUERY).await {
            Ok(Some(payload)) => serde_json::from_value(payload)
                .map(Some)
                .map_err(DispatchError::Decode),
            Ok(None) => Ok(Some(WorkflowRunResult::new(
                RunStatus::Created,
                GENERIC_WEBLINK,
                timestamp::now(),
            ))),
            Err(EngineError::RunNotFound { .. }) => return Ok(None),
            Err(err) => Err(DispatchError::Engine(err)),
        };

        match outcome {
            Err(err) if self.query_errors == QueryErrorPolicy::NotFound => {
                warn!(%identity, error = %err, "query failed, reporting run as not found");
                Ok(None)
            }
            other => other,
        }
    }
}
