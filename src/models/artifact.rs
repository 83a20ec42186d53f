use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::timestamp;

/// Keys that only carry meaning for evergreen artifacts. Downstream schema
/// validation rejects them when they are present on a non-evergreen
/// artifact, so they are dropped from the external form instead of being
/// written as empty values.
pub const EVERGREEN_FIELDS: [&str; 3] = [
    "evergreen_last_reminder_at",
    "evergreen_owner",
    "evergreen_reminder_interval",
];

/// One item produced by a workflow step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub resource_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub description: String,
    pub weblink: String,
    #[serde(default)]
    pub evergreen: bool,
    #[serde(default)]
    pub evergreen_owner: Option<String>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub evergreen_last_reminder_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evergreen_reminder_interval: Option<i64>,
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// A non-evergreen artifact whose name and resource id are both derived
    /// from `resource_id`.
    pub fn new(
        resource_id: impl Into<String>,
        weblink: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let resource_id = resource_id.into();
        Self {
            name: resource_id.clone(),
            resource_id,
            resource_type: String::new(),
            description: description.into(),
            weblink: weblink.into(),
            evergreen: false,
            evergreen_owner: None,
            evergreen_last_reminder_at: None,
            evergreen_reminder_interval: None,
            filters: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The full external field list, in output order.
    fn external_fields(&self) -> [(&'static str, Value); 12] {
        [
            ("created_at", json!(timestamp::format(&self.created_at))),
            ("description", json!(self.description)),
            ("evergreen", json!(self.evergreen)),
            (
                "evergreen_last_reminder_at",
                json!(self.evergreen_last_reminder_at.as_ref().map(timestamp::format)),
            ),
            ("evergreen_owner", json!(self.evergreen_owner)),
            (
                "evergreen_reminder_interval",
                json!(self.evergreen_reminder_interval),
            ),
            ("filters", json!(self.filters)),
            ("name", json!(self.name)),
            ("resource_id", json!(self.resource_id)),
            ("resource_type", json!(self.resource_type)),
            ("updated_at", json!(timestamp::format(&self.updated_at))),
            ("weblink", json!(self.weblink)),
        ]
    }

    fn omits(&self, key: &str) -> bool {
        !self.evergreen && EVERGREEN_FIELDS.contains(&key)
    }
}

impl Serialize for Artifact {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let fields: Vec<_> = self
            .external_fields()
            .into_iter()
            .filter(|(key, _)| !self.omits(key))
            .collect();

        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in &fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
