use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::PathCache;

/// Serve a cached body for the request path, or forward on a miss.
///
/// Population happens in the handlers once a body is fully serialized.
pub async fn serve_cached(
    State(cache): State<Arc<PathCache>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if let Some(body) = cache.get(path) {
        debug!(target: "morpho::cache", path, outcome = "hit", "serving cached response");
        return ([(header::CONTENT_TYPE, "application/json")], body).into_response();
    }

    debug!(target: "morpho::cache", path, outcome = "miss", "forwarding to handler");
    next.run(request).await
}
