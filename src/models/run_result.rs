use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::artifact::Artifact;
use super::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "Created",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            RunStatus::Created => 0,
            RunStatus::Running => 1,
            RunStatus::Completed | RunStatus::Failed => 2,
        }
    }

    /// Status only moves forward; `Failed` is reachable from any
    /// non-terminal state and nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == RunStatus::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot move run from {from} to {to}")]
    Illegal { from: RunStatus, to: RunStatus },
    #[error("run is {status} and can no longer change")]
    Sealed { status: RunStatus },
}

/// Observable state of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub artifacts: Vec<Artifact>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub run_reason: String,
    pub status: RunStatus,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    pub weblink: String,
}

impl WorkflowRunResult {
    pub fn new(status: RunStatus, weblink: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            artifacts: Vec::new(),
            created_at: now,
            parameters: None,
            resource_id: String::new(),
            resource_type: String::new(),
            run_reason: String::new(),
            status,
            updated_at: now,
            weblink: weblink.into(),
        }
    }

    pub fn transition(&mut self, next: RunStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn push_artifact(&mut self, artifact: Artifact, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.artifacts.push(artifact);
        self.updated_at = now;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Sealed {
                status: self.status,
            });
        }
        Ok(())
    }
}
