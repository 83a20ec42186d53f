pub mod random_dog;
pub mod random_unsplash;
mod registry;
mod run_state;
mod step_workflow;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::engine::{EngineError, WorkflowContext};
use crate::models::params::Params;
use crate::models::run_result::{TransitionError, WorkflowRunResult};

pub use registry::{RegistryError, WorkflowRegistry, WorkflowRegistryBuilder};
pub use run_state::RunState;
pub use step_workflow::{Step, StepWorkflow};

/// A named workflow type the engine can execute.
#[async_trait]
pub trait WorkflowDefinition: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: WorkflowContext,
        params: Params,
    ) -> Result<WorkflowRunResult, WorkflowError>;
}

/// A unit of externally visible work invoked from a workflow step.
#[async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, params: &Params) -> Result<Value, ActivityError>;
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid activity input: {0}")]
    Input(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned an unusable response: {0}")]
    Upstream(String),
    #[error("activity output could not be decoded: {0}")]
    Payload(String),
    #[error("activity exceeded its {0:?} start-to-close timeout")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to install query handler: {0}")]
    QueryHandler(#[source] EngineError),
    #[error("activity {0} is not registered")]
    UnknownActivity(String),
    #[error("activity {activity} failed: {source}")]
    Activity {
        activity: String,
        #[source]
        source: ActivityError,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub step_delay: Duration,
    pub dog_api_base_url: String,
    pub unsplash_base_url: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(15),
            dog_api_base_url: random_dog::DEFAULT_API_BASE_URL.to_string(),
            unsplash_base_url: random_unsplash::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Registry holding every workflow and activity this service ships.
pub fn default_registry(settings: &WorkflowSettings) -> Result<WorkflowRegistry, SetupError> {
    let registry = WorkflowRegistry::builder()
        .register_workflow(random_dog::workflow(settings.step_delay))?
        .register_activity(random_dog::FetchRandomDog::new(&settings.dog_api_base_url)?)?
        .register_workflow(random_unsplash::workflow(settings.step_delay))?
        .register_activity(random_unsplash::FetchRandomUnsplash::new(
            &settings.unsplash_base_url,
        )?)?
        .build();
    Ok(registry)
}

/// Last path segment of a URL (or of a plain path), ignoring any query.
pub(crate) fn url_basename(raw: &str) -> String {
    let path = match reqwest::Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ if path.starts_with('/') => "/".to_string(),
        _ => ".".to_string(),
    }
}
