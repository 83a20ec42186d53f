use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{url_basename, Activity, ActivityError, Step, StepWorkflow};
use crate::models::artifact::Artifact;
use crate::models::params::{Params, INSTANCE_ID_KEY};
use crate::models::timestamp;

pub const NAME: &str = "random_dog";
pub const WEBLINK: &str = "https://dog.ceo/";
pub const FETCH_ACTIVITY: &str = "fetch_random_dog";
pub const DEFAULT_API_BASE_URL: &str = "https://dog.ceo";

/// Fetches two random dog pictures, one step at a time.
pub fn workflow(step_delay: Duration) -> StepWorkflow {
    StepWorkflow::new(
        NAME,
        WEBLINK,
        vec![
            Step::new(step_delay, FETCH_ACTIVITY, "Dog 1"),
            Step::new(step_delay, FETCH_ACTIVITY, "Dog 2"),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct DogResponse {
    message: String,
    status: String,
}

pub struct FetchRandomDog {
    client: Client,
    base_url: String,
}

impl FetchRandomDog {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(1)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Activity for FetchRandomDog {
    fn name(&self) -> &'static str {
        FETCH_ACTIVITY
    }

    async fn execute(&self, params: &Params) -> Result<Value, ActivityError> {
        info!(activity = FETCH_ACTIVITY, instance_id = ?params.get(INSTANCE_ID_KEY), "fetching random dog");

        let url = format!("{}/api/breeds/image/random", self.base_url);
        let body: DogResponse = self.client.get(url).send().await?.json().await?;
        if body.status != "success" {
            return Err(ActivityError::Upstream(body.message));
        }

        let artifact = Artifact::new(
            url_basename(&body.message),
            body.message,
            "Random dog",
            timestamp::now(),
        );
        serde_json::to_value(artifact).map_err(|e| ActivityError::Payload(e.to_string()))
    }
}
