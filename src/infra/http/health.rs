use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{error::ErrorReport, repos::RepoError};

use super::HttpState;

pub(super) fn routes() -> Router<HttpState> {
    Router::new().route("/_health/db", get(db_health))
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.catalog.health_check().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
