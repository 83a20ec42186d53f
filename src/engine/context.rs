use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use super::EngineError;
use crate::models::{params::Params, timestamp};
use crate::workflows::{ActivityError, WorkflowError, WorkflowRegistry};

pub(crate) type QueryHandler = Arc<dyn Fn() -> Result<Value, serde_json::Error> + Send + Sync>;
pub(crate) type QueryTable = DashMap<String, QueryHandler>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle a running workflow uses to reach engine services: the clock,
/// timers, activities and query handlers.
#[derive(Clone)]
pub struct WorkflowContext {
    workflow_id: String,
    run_id: Uuid,
    registry: Arc<WorkflowRegistry>,
    queries: Arc<QueryTable>,
    activity_options: ActivityOptions,
}

impl WorkflowContext {
    pub(crate) fn new(
        workflow_id: String,
        run_id: Uuid,
        registry: Arc<WorkflowRegistry>,
        queries: Arc<QueryTable>,
    ) -> Self {
        Self {
            workflow_id,
            run_id,
            registry,
            queries,
            activity_options: ActivityOptions::default(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        timestamp::now()
    }

    pub fn with_activity_options(mut self, options: ActivityOptions) -> Self {
        self.activity_options = options;
        self
    }

    pub async fn sleep(&self, duration: Duration) {
        debug!(workflow_id = %self.workflow_id, ?duration, "timer started");
        tokio::time::sleep(duration).await;
        debug!(workflow_id = %self.workflow_id, "timer fired");
    }

    /// Installs a handler answering `name` queries. The handler runs on the
    /// querying task and must not block.
    pub fn set_query_handler<F, T>(&self, name: &str, handler: F) -> Result<(), EngineError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Serialize,
    {
        if name.is_empty() {
            return Err(EngineError::InvalidQueryName);
        }
        match self.queries.entry(name.to_string()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateQueryHandler(name.to_string())),
            Entry::Vacant(slot) => {
                let handler: QueryHandler = Arc::new(move || serde_json::to_value(handler()));
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Runs the registered activity `name` under the context's activity
    /// options and decodes its output.
    pub async fn execute_activity<T>(&self, name: &str, params: &Params) -> Result<T, WorkflowError>
    where
        T: DeserializeOwned,
    {
        let activity = self
            .registry
            .activity(name)
            .ok_or_else(|| WorkflowError::UnknownActivity(name.to_string()))?;

        let limit = self.activity_options.start_to_close_timeout;
        let output = match timeout(limit, activity.execute(params)).await {
            Ok(Ok(value)) => value,
            Ok(Err(source)) => {
                return Err(WorkflowError::Activity {
                    activity: name.to_string(),
                    source,
                })
            }
            Err(_) => {
                warn!(workflow_id = %self.workflow_id, activity = name, ?limit, "activity timed out");
                return Err(WorkflowError::Activity {
                    activity: name.to_string(),
                    source: ActivityError::Timeout(limit),
                });
            }
        };

        serde_json::from_value(output).map_err(|err| WorkflowError::Activity {
            activity: name.to_string(),
            source: ActivityError::Payload(err.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::Activity;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Activity for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn execute(&self, params: &Params) -> Result<Value, ActivityError> {
            let term = params
                .get_str("term")
                .map_err(|e| ActivityError::Input(e.to_string()))?;
            Ok(json!({ "term": term }))
        }
    }

    struct Stall;

    #[async_trait]
    impl Activity for Stall {
        fn name(&self) -> &'static str {
            "stall"
        }

        async fn execute(&self, _params: &Params) -> Result<Value, ActivityError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    fn context() -> WorkflowContext {
        let registry = WorkflowRegistry::builder()
            .register_activity(Echo)
            .unwrap()
            .register_activity(Stall)
            .unwrap()
            .build();
        WorkflowContext::new(
            "test-1".into(),
            Uuid::new_v4(),
            Arc::new(registry),
            Arc::new(QueryTable::new()),
        )
    }

    #[tokio::test]
    async fn executes_registered_activity() {
        let ctx = context();
        let params = Params::new().with("term", "love");
        let out: Value = ctx.execute_activity("echo", &params).await.unwrap();
        assert_eq!(out, json!({ "term": "love" }));
    }

    #[tokio::test]
    async fn unknown_activity_is_an_error() {
        let ctx = context();
        let err = ctx
            .execute_activity::<Value>("missing", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownActivity(name) if name == "missing"));
    }

    #[tokio::test]
    async fn activity_error_carries_activity_name() {
        let ctx = context();
        let err = ctx
            .execute_activity::<Value>("echo", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Activity { ref activity, source: ActivityError::Input(_) } if activity == "echo"
        ));
    }

    #[tokio::test]
    async fn activity_times_out() {
        let ctx = context().with_activity_options(ActivityOptions {
            start_to_close_timeout: Duration::from_millis(20),
        });
        let err = ctx
            .execute_activity::<Value>("stall", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Activity { source: ActivityError::Timeout(_), .. }
        ));
    }

    #[test]
    fn query_handlers_are_unique_and_named() {
        let ctx = context();
        ctx.set_query_handler("state", || 1).unwrap();
        assert_eq!(
            ctx.set_query_handler("state", || 2),
            Err(EngineError::DuplicateQueryHandler("state".into()))
        );
        assert_eq!(ctx.set_query_handler("", || 3), Err(EngineError::InvalidQueryName));

        let handler = ctx.queries.get("state").unwrap().clone();
        assert_eq!(handler().unwrap(), json!(1));
    }
}
