use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{Activity, WorkflowDefinition};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("workflow {0} is already registered")]
    DuplicateWorkflow(String),
    #[error("activity {0} is already registered")]
    DuplicateActivity(String),
}

/// Immutable name → definition mapping shared by the engine, its worker and
/// the dispatch client. Built once at startup through
/// [`WorkflowRegistryBuilder`].
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<&'static str, Arc<dyn WorkflowDefinition>>,
    activities: HashMap<&'static str, Arc<dyn Activity>>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder::default()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn WorkflowDefinition>> {
        self.workflows.get(name).cloned()
    }

    pub fn activity(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn workflow_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.workflows.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct WorkflowRegistryBuilder {
    inner: WorkflowRegistry,
}

impl WorkflowRegistryBuilder {
    pub fn register_workflow<W>(mut self, workflow: W) -> Result<Self, RegistryError>
    where
        W: WorkflowDefinition + 'static,
    {
        let name = workflow.name();
        if self.inner.workflows.contains_key(name) {
            return Err(RegistryError::DuplicateWorkflow(name.to_string()));
        }
        self.inner.workflows.insert(name, Arc::new(workflow));
        Ok(self)
    }

    pub fn register_activity<A>(mut self, activity: A) -> Result<Self, RegistryError>
    where
        A: Activity + 'static,
    {
        let name = activity.name();
        if self.inner.activities.contains_key(name) {
            return Err(RegistryError::DuplicateActivity(name.to_string()));
        }
        self.inner.activities.insert(name, Arc::new(activity));
        Ok(self)
    }

    pub fn build(self) -> WorkflowRegistry {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{random_dog, random_unsplash};
    use std::time::Duration;

    #[test]
    fn duplicate_workflow_registration_is_rejected() {
        let err = WorkflowRegistry::builder()
            .register_workflow(random_dog::workflow(Duration::ZERO))
            .unwrap()
            .register_workflow(random_dog::workflow(Duration::ZERO))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateWorkflow("random_dog".into()));
    }

    #[test]
    fn duplicate_activity_registration_is_rejected() {
        let err = WorkflowRegistry::builder()
            .register_activity(random_dog::FetchRandomDog::new("http://localhost").unwrap())
            .unwrap()
            .register_activity(random_dog::FetchRandomDog::new("http://localhost").unwrap())
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateActivity("fetch_random_dog".into()));
    }

    #[test]
    fn resolves_registered_names_only() {
        let registry = WorkflowRegistry::builder()
            .register_workflow(random_dog::workflow(Duration::ZERO))
            .unwrap()
            .register_workflow(random_unsplash::workflow(Duration::ZERO))
            .unwrap()
            .build();

        assert_eq!(registry.workflow_names(), vec!["random_dog", "random_unsplash"]);
        assert_eq!(registry.resolve("random_dog").unwrap().name(), "random_dog");
        assert!(registry.resolve("random_cat").is_none());
        assert!(registry.activity("fetch_random_dog").is_none());
    }
}
