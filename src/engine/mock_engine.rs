use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{EngineError, RunHandle, StartOptions, WorkflowEngine};
use crate::models::params::Params;
use crate::workflows::WorkflowDefinition;

type StartFn = Box<dyn Fn(&StartOptions) -> Result<RunHandle, EngineError> + Send + Sync>;
type QueryFn = Box<dyn Fn(&str, &str) -> Result<Option<Value>, EngineError> + Send + Sync>;

pub struct MockEngine {
    pub start_fn: StartFn,
    pub query_fn: QueryFn,
    pub starts: Mutex<Vec<(StartOptions, String, Params)>>,
    pub queries: Mutex<Vec<(String, String)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            start_fn: Box::new(|options| {
                Ok(RunHandle {
                    workflow_id: options.workflow_id.clone(),
                    run_id: Uuid::new_v4(),
                })
            }),
            query_fn: Box::new(|workflow_id, _| {
                Err(EngineError::RunNotFound {
                    workflow_id: workflow_id.to_string(),
                })
            }),
            starts: Mutex::new(vec![]),
            queries: Mutex::new(vec![]),
        }
    }
}

impl MockEngine {
    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .map(|(options, _, _)| options.workflow_id.clone())
            .collect()
    }
}

#[async_trait]
impl WorkflowEngine for MockEngine {
    async fn start_run(
        &self,
        options: StartOptions,
        definition: Arc<dyn WorkflowDefinition>,
        params: Params,
    ) -> Result<RunHandle, EngineError> {
        let res = (self.start_fn)(&options);
        self.starts
            .lock()
            .unwrap()
            .push((options, definition.name().to_string(), params));
        res
    }

    async fn query_run(
        &self,
        workflow_id: &str,
        query_name: &str,
    ) -> Result<Option<Value>, EngineError> {
        self.queries
            .lock()
            .unwrap()
            .push((workflow_id.to_string(), query_name.to_string()));
        (self.query_fn)(workflow_id, query_name)
    }
}
