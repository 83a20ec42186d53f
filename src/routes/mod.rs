pub mod workflow;

use axum::{
    response::{IntoResponse, Response},
    routing::{any, get, MethodRouter},
    Router,
};

use crate::responses::JsonResponse;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/workflow", any(workflow::redirect_to_subtree))
        .route("/workflow/", workflow_methods())
        .route("/workflow/{*rest}", workflow_methods())
        .with_state(state)
}

/// Everything under `/workflow/` is served by the same handlers.
fn workflow_methods() -> MethodRouter<AppState> {
    get(workflow::query_workflow)
        .post(workflow::start_workflow)
        .fallback(workflow::not_found)
}

async fn root() -> Response {
    JsonResponse::success("workflow dispatch is up").into_response()
}
