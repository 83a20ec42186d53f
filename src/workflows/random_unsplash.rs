use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect, Client};
use serde_json::Value;
use tracing::info;

use super::{url_basename, Activity, ActivityError, Step, StepWorkflow};
use crate::models::artifact::Artifact;
use crate::models::params::{Params, INSTANCE_ID_KEY};
use crate::models::timestamp;

pub const NAME: &str = "random_unsplash";
pub const WEBLINK: &str = "https://unsplash.com/";
pub const FETCH_ACTIVITY: &str = "fetch_random_unsplash";
pub const DEFAULT_BASE_URL: &str = "https://source.unsplash.com";

/// Fetches two random Unsplash photos, optionally narrowed by a `term`
/// parameter.
pub fn workflow(step_delay: Duration) -> StepWorkflow {
    StepWorkflow::new(
        NAME,
        WEBLINK,
        vec![
            Step::new(step_delay, FETCH_ACTIVITY, "Photo 1"),
            Step::new(step_delay, FETCH_ACTIVITY, "Photo 2"),
        ],
    )
}

/// Asks Unsplash for a random photo and records where the redirect points.
/// The redirect is not followed.
pub struct FetchRandomUnsplash {
    client: Client,
    base_url: String,
}

impl FetchRandomUnsplash {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(1))
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self, params: &Params) -> String {
        let mut url = format!("{}/random/400x320?", self.base_url);
        // A non-string term is ignored rather than failing the step.
        if let Ok(Some(term)) = params.optional_str("term") {
            url.push_str(&urlencoding::encode(term));
        }
        url
    }
}

#[async_trait]
impl Activity for FetchRandomUnsplash {
    fn name(&self) -> &'static str {
        FETCH_ACTIVITY
    }

    async fn execute(&self, params: &Params) -> Result<Value, ActivityError> {
        info!(activity = FETCH_ACTIVITY, instance_id = ?params.get(INSTANCE_ID_KEY), "fetching random unsplash photo");

        let response = self.client.head(self.request_url(params)).send().await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ActivityError::Upstream(format!(
                    "expected a redirect with a Location header, got {}",
                    response.status()
                ))
            })?
            .to_string();

        let artifact = Artifact::new(
            url_basename(&location),
            location,
            "Random photo from Unsplash",
            timestamp::now(),
        );
        serde_json::to_value(artifact).map_err(|e| ActivityError::Payload(e.to_string()))
    }
}
