use std::fmt;

use tracing::warn;

use crate::models::params::{ParamError, Params};

/// The key a run is started and queried under: the workflow type name,
/// optionally suffixed with `-<instance id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// Identity for a start request. A numeric `instance_id` becomes the
    /// suffix whether it arrived as an integer or a float; anything else is
    /// ignored with a warning.
    pub fn for_start(workflow_type: &str, params: &Params) -> Self {
        match params.instance_id() {
            Ok(Some(id)) => Self::with_suffix(workflow_type, &id.to_string()),
            Ok(None) => Self(workflow_type.to_string()),
            Err(ParamError::WrongType { found, .. }) => {
                warn!(workflow_type, found, "instance_id is not numeric, starting without suffix");
                Self(workflow_type.to_string())
            }
            Err(err) => {
                warn!(workflow_type, error = %err, "instance_id unusable, starting without suffix");
                Self(workflow_type.to_string())
            }
        }
    }

    /// Identity for a query. The instance id is taken verbatim.
    pub fn for_query(workflow_type: &str, instance_id: &str) -> Self {
        if instance_id.is_empty() {
            Self(workflow_type.to_string())
        } else {
            Self::with_suffix(workflow_type, instance_id)
        }
    }

    fn with_suffix(workflow_type: &str, suffix: &str) -> Self {
        Self(format!("{workflow_type}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
