use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::WorkflowError;
use crate::engine::{WorkflowContext, STATE_QUERY};
use crate::models::artifact::Artifact;
use crate::models::run_result::{RunStatus, TransitionError, WorkflowRunResult};

/// The result object a workflow instance owns and mutates while it runs.
///
/// Every mutation publishes a fresh snapshot that the `state` query handler
/// hands out, so queries never wait on the instance and never see a
/// half-applied change.
pub struct RunState {
    tx: watch::Sender<WorkflowRunResult>,
}

impl RunState {
    /// Initializes a running result and installs the `state` query handler.
    pub fn begin(ctx: &WorkflowContext, weblink: &str) -> Result<Self, WorkflowError> {
        let now = ctx.now();
        let (tx, rx) = watch::channel(WorkflowRunResult::new(RunStatus::Running, weblink, now));
        let state = Self { tx };

        if let Err(err) = ctx.set_query_handler(STATE_QUERY, move || rx.borrow().clone()) {
            state.fail(now);
            return Err(WorkflowError::QueryHandler(err));
        }
        Ok(state)
    }

    pub fn snapshot(&self) -> WorkflowRunResult {
        self.tx.borrow().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.tx.borrow().status
    }

    pub fn append(&self, artifact: Artifact, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.apply(|result| result.push_artifact(artifact, now))
    }

    /// Marks the run failed. A run that already reached a terminal state is
    /// left untouched.
    pub fn fail(&self, now: DateTime<Utc>) {
        let _ = self.apply(|result| result.transition(RunStatus::Failed, now));
    }

    /// Moves the run to `Completed` and returns the final snapshot. The
    /// state is consumed so nothing can mutate the result afterwards.
    pub fn complete(self, now: DateTime<Utc>) -> Result<WorkflowRunResult, WorkflowError> {
        self.apply(|result| result.transition(RunStatus::Completed, now))?;
        Ok(self.snapshot())
    }

    fn apply<F>(&self, change: F) -> Result<(), WorkflowError>
    where
        F: FnOnce(&mut WorkflowRunResult) -> Result<(), TransitionError>,
    {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|result| {
            outcome = change(result);
            outcome.is_ok()
        });
        outcome.map_err(WorkflowError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::QueryTable;
    use crate::workflows::WorkflowRegistry;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn context(queries: Arc<QueryTable>) -> WorkflowContext {
        WorkflowContext::new(
            "random_dog-1".into(),
            Uuid::new_v4(),
            Arc::new(WorkflowRegistry::builder().build()),
            queries,
        )
    }

    fn query(queries: &QueryTable) -> serde_json::Value {
        let handler = queries.get(STATE_QUERY).unwrap().clone();
        handler().unwrap()
    }

    #[test]
    fn query_handler_tracks_every_change() {
        let queries = Arc::new(QueryTable::new());
        let ctx = context(queries.clone());
        let state = RunState::begin(&ctx, "https://dog.ceo/").unwrap();

        let before = query(&queries);
        assert_eq!(before["status"], json!("Running"));
        assert_eq!(before["artifacts"], json!([]));
        assert_eq!(before["weblink"], json!("https://dog.ceo/"));

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        state
            .append(Artifact::new("a.jpg", "https://img/a.jpg", "Dog 1", at), at)
            .unwrap();
        let during = query(&queries);
        assert_eq!(during["artifacts"][0]["description"], json!("Dog 1"));
        assert_eq!(during["updated_at"], json!("2024-01-01 00:00:00"));

        let done = state.complete(ctx.now()).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(query(&queries)["status"], json!("Completed"));
    }

    #[test]
    fn failing_handler_install_marks_run_failed() {
        let queries = Arc::new(QueryTable::new());
        let ctx = context(queries.clone());
        ctx.set_query_handler(STATE_QUERY, || "taken").unwrap();

        let err = RunState::begin(&ctx, "https://dog.ceo/").err().unwrap();
        assert!(matches!(err, WorkflowError::QueryHandler(_)));
        assert_eq!(query(&queries), json!("taken"));
    }

    #[test]
    fn failed_run_cannot_complete() {
        let queries = Arc::new(QueryTable::new());
        let ctx = context(queries.clone());
        let state = RunState::begin(&ctx, "").unwrap();
        state.fail(ctx.now());
        assert_eq!(state.status(), RunStatus::Failed);

        let err = state.complete(ctx.now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Transition(_)));
        assert_eq!(query(&queries)["status"], json!("Failed"));
    }
}
