use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use super::{RunState, WorkflowDefinition, WorkflowError};
use crate::engine::WorkflowContext;
use crate::models::artifact::Artifact;
use crate::models::params::{Params, INSTANCE_ID_KEY};
use crate::models::run_result::WorkflowRunResult;

/// One suspend-then-produce step: wait `delay`, run `activity`, attach the
/// artifact it returns under `label`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub activity: &'static str,
    pub label: String,
}

impl Step {
    pub fn new(delay: Duration, activity: &'static str, label: impl Into<String>) -> Self {
        Self {
            delay,
            activity,
            label: label.into(),
        }
    }
}

/// A workflow made of a fixed sequence of artifact-producing steps.
pub struct StepWorkflow {
    name: &'static str,
    weblink: &'static str,
    steps: Vec<Step>,
}

impl StepWorkflow {
    pub fn new(name: &'static str, weblink: &'static str, steps: Vec<Step>) -> Self {
        Self {
            name,
            weblink,
            steps,
        }
    }

    pub fn weblink(&self) -> &'static str {
        self.weblink
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[async_trait]
impl WorkflowDefinition for StepWorkflow {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(
        &self,
        ctx: WorkflowContext,
        params: Params,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        let state = RunState::begin(&ctx, self.weblink)?;
        info!(
            workflow = self.name,
            workflow_id = %ctx.workflow_id(),
            run_id = %ctx.run_id(),
            instance_id = ?params.get(INSTANCE_ID_KEY),
            "workflow started"
        );

        for step in &self.steps {
            if !step.delay.is_zero() {
                ctx.sleep(step.delay).await;
            }

            let mut artifact: Artifact = match ctx.execute_activity(step.activity, &params).await {
                Ok(artifact) => artifact,
                Err(err) => {
                    state.fail(ctx.now());
                    error!(
                        workflow = self.name,
                        workflow_id = %ctx.workflow_id(),
                        activity = step.activity,
                        error = %err,
                        "workflow step failed"
                    );
                    return Err(err);
                }
            };
            artifact.description = step.label.clone();
            state.append(artifact, ctx.now())?;
        }

        let result = state.complete(ctx.now())?;
        info!(
            workflow = self.name,
            workflow_id = %ctx.workflow_id(),
            artifacts = result.artifacts.len(),
            "workflow completed"
        );
        Ok(result)
    }
}
