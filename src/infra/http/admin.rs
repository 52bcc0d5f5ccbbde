use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::{auth::AuthenticatedIdentity, error::HttpError};

use super::HttpState;

pub(super) fn routes() -> Router<HttpState> {
    Router::new().route("/admin/cache/purge/", post(purge_cache))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PurgeRequest {
    prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    removed: usize,
}

/// Invalidation hook for writers outside this service. An empty body purges everything.
async fn purge_cache(
    State(state): State<HttpState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    body: Bytes,
) -> Result<Json<PurgeResponse>, HttpError> {
    let request: PurgeRequest = if body.is_empty() {
        PurgeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            HttpError::from_error(
                "infra::http::admin::purge_cache",
                StatusCode::BAD_REQUEST,
                "Invalid request body.",
                &err,
            )
        })?
    };

    let removed = match (state.cache.as_ref(), request.prefix.as_deref()) {
        (None, _) => 0,
        (Some(cache), Some(prefix)) => cache.invalidate_prefix(prefix),
        (Some(cache), None) => cache.invalidate_all(),
    };

    info!(
        target: "morpho::cache",
        username = %identity.username,
        prefix = request.prefix.as_deref().unwrap_or("*"),
        removed,
        "cache purged"
    );
    Ok(Json(PurgeResponse { removed }))
}
