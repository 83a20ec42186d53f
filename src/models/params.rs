use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INSTANCE_ID_KEY: &str = "instance_id";

/// A single scalar value in a workflow parameter bag.
///
/// Callers send loosely typed JSON, so the same logical value may arrive as
/// an integer or as a float. Nested arrays and objects are not accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Integer(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
        }
    }

    /// Integral view of a numeric value. Floats are truncated toward zero;
    /// non-finite floats and non-numeric values yield `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            ParamValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("parameter `{key}` is missing")]
    Missing { key: String },
    #[error("parameter `{key}` has type {found}, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// The parameter bag passed to a workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn require(&self, key: &str) -> Result<&ParamValue, ParamError> {
        self.0.get(key).ok_or_else(|| ParamError::Missing {
            key: key.to_string(),
        })
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ParamError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| ParamError::WrongType {
            key: key.to_string(),
            expected: "string",
            found: value.kind(),
        })
    }

    pub fn get_integer(&self, key: &str) -> Result<i64, ParamError> {
        let value = self.require(key)?;
        value.as_integer().ok_or_else(|| ParamError::WrongType {
            key: key.to_string(),
            expected: "number",
            found: value.kind(),
        })
    }

    /// Like [`Params::get_str`], but a missing or null key is `Ok(None)`.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, ParamError> {
        match self.0.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(_) => self.get_str(key).map(Some),
        }
    }

    /// Like [`Params::get_integer`], but a missing or null key is `Ok(None)`.
    pub fn optional_integer(&self, key: &str) -> Result<Option<i64>, ParamError> {
        match self.0.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(_) => self.get_integer(key).map(Some),
        }
    }

    pub fn instance_id(&self) -> Result<Option<i64>, ParamError> {
        self.optional_integer(INSTANCE_ID_KEY)
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
