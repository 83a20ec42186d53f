use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::LOCATION, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::dispatch::DispatchError;
use crate::engine::EngineError;
use crate::models::params::Params;
use crate::responses::JsonResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowQuery {
    pub workflow_id: String,
    pub workflow_instance_id: String,
}

/// Body of a start request:
/// `{"workflow_id": "random_unsplash", "params": {"instance_id": 43, "term": "love"}}`
/// A missing or `null` `params` is an empty bag.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub workflow_id: String,
    pub params: Option<Params>,
}

pub async fn query_workflow(
    State(state): State<AppState>,
    Query(query): Query<WorkflowQuery>,
) -> Response {
    info!(
        workflow_type = %query.workflow_id,
        instance_id = %query.workflow_instance_id,
        "query workflow"
    );

    match state
        .dispatch
        .query(&query.workflow_id, &query.workflow_instance_id)
        .await
    {
        Ok(Some(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(None) => JsonResponse::not_found("workflow run not found").into_response(),
        Err(err) => {
            warn!(?err, "query failed");
            JsonResponse::bad_gateway(&err.to_string()).into_response()
        }
    }
}

pub async fn start_workflow(State(state): State<AppState>, body: Bytes) -> Response {
    let request: StartRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejecting malformed start request");
            return JsonResponse::bad_request(&err.to_string()).into_response();
        }
    };
    info!(workflow_type = %request.workflow_id, params = ?request.params, "start workflow");

    match state
        .dispatch
        .start(&request.workflow_id, request.params.unwrap_or_default())
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(DispatchError::Engine(err @ EngineError::AlreadyStarted { .. })) => {
            JsonResponse::conflict(&err.to_string()).into_response()
        }
        Err(err) => JsonResponse::server_error(&err.to_string()).into_response(),
    }
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// `/workflow` moves permanently to `/workflow/`, keeping the query string.
pub async fn redirect_to_subtree(uri: Uri) -> Response {
    let location = match uri.query() {
        Some(query) => format!("/workflow/?{query}"),
        None => "/workflow/".to_string(),
    };
    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
}
