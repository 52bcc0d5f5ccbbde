use std::collections::HashMap;

use axum::{
    Router,
    extract::{Path, State},
    http::{Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Serialize;

use crate::application::{
    error::HttpError,
    repos::{ProjectSelection, SolutionSelection},
};

use super::HttpState;

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/project/", get(list_projects))
        .route("/project/{project}/", get(project_detail))
        .route("/project/{project}/model/", get(list_solutions))
        .route("/project/{project}/model/{solution}/", get(list_solutions))
}

async fn list_projects(State(state): State<HttpState>, uri: Uri) -> Result<Response, HttpError> {
    projects(&state, uri.path(), &HashMap::new()).await
}

async fn project_detail(
    State(state): State<HttpState>,
    Path(params): Path<HashMap<String, String>>,
    uri: Uri,
) -> Result<Response, HttpError> {
    projects(&state, uri.path(), &params).await
}

async fn list_solutions(
    State(state): State<HttpState>,
    Path(params): Path<HashMap<String, String>>,
    uri: Uri,
) -> Result<Response, HttpError> {
    let selection = SolutionSelection::from_params(&params);
    let records = state.catalog.solutions(&selection).await?;
    respond_and_cache(&state, uri.path(), &records)
}

async fn projects(
    state: &HttpState,
    path: &str,
    params: &HashMap<String, String>,
) -> Result<Response, HttpError> {
    let selection = ProjectSelection::from_params(params);
    let records = state.catalog.projects(&selection).await?;
    respond_and_cache(state, path, &records)
}

/// Serialize the full body before it becomes visible in the cache.
fn respond_and_cache<T: Serialize>(
    state: &HttpState,
    path: &str,
    records: &T,
) -> Result<Response, HttpError> {
    let body = Bytes::from(serde_json::to_vec(records)?);
    if let Some(cache) = state.cache.as_ref() {
        cache.put(path, body.clone());
    }
    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}
