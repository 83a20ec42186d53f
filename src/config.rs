use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::QueryErrorPolicy;
use crate::workflows::{random_dog, random_unsplash, WorkflowSettings};

pub const DEFAULT_API_ADDR: &str = "127.0.0.1:8888";
pub const DEFAULT_TASK_QUEUE: &str = "dispatch";
pub const DEFAULT_STEP_DELAY_SECS: u64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is not a valid socket address: {value}")]
    InvalidAddr { key: &'static str, value: String },
    #[error("{key} must be true or false, got {value}")]
    InvalidBool { key: &'static str, value: String },
    #[error("{key} must be a whole number of seconds, got {value}")]
    InvalidSeconds { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_addr: SocketAddr,
    pub task_queue: String,
    pub query_errors: QueryErrorPolicy,
    pub dog_api_base_url: String,
    pub unsplash_base_url: String,
    pub step_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_addr = {
            let key = "API_ADDR";
            let raw = lookup(key).unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
            raw.parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidAddr { key, value: raw })?
        };

        let task_queue = non_empty(&lookup, "TASK_QUEUE", DEFAULT_TASK_QUEUE)?;

        let query_errors = match lookup("QUERY_ERRORS_AS_NOT_FOUND") {
            None => QueryErrorPolicy::NotFound,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => QueryErrorPolicy::NotFound,
                "0" | "false" | "no" => QueryErrorPolicy::Propagate,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        key: "QUERY_ERRORS_AS_NOT_FOUND",
                        value: raw,
                    })
                }
            },
        };

        let dog_api_base_url =
            non_empty(&lookup, "DOG_API_BASE_URL", random_dog::DEFAULT_API_BASE_URL)?;
        let unsplash_base_url =
            non_empty(&lookup, "UNSPLASH_BASE_URL", random_unsplash::DEFAULT_BASE_URL)?;

        let step_delay = match lookup("WORKFLOW_STEP_DELAY_SECS") {
            None => Duration::from_secs(DEFAULT_STEP_DELAY_SECS),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidSeconds {
                    key: "WORKFLOW_STEP_DELAY_SECS",
                    value: raw,
                })?,
        };

        Ok(Config {
            api_addr,
            task_queue,
            query_errors,
            dog_api_base_url,
            unsplash_base_url,
            step_delay,
        })
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            step_delay: self.step_delay,
            dog_api_base_url: self.dog_api_base_url.clone(),
            unsplash_base_url: self.unsplash_base_url.clone(),
        }
    }
}

fn non_empty<F>(lookup: &F, key: &'static str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default.to_string()),
        Some(raw) if raw.trim().is_empty() => Err(ConfigError::Empty { key }),
        Some(raw) => Ok(raw.trim().to_string()),
    }
}
