mod admin;
mod auth;
mod catalog;
mod health;
mod middleware;
mod pipeline;

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, StatusCode},
    middleware as axum_middleware,
    response::Response,
};

use crate::{
    application::{
        auth::{AuthService, CredentialVerifier},
        catalog::CatalogService,
        error::message_response,
    },
    cache::PathCache,
};

pub use middleware::{RequestContext, log_requests, set_request_context};
pub use pipeline::Pipeline;

#[derive(Clone)]
pub struct HttpState {
    pub catalog: Arc<CatalogService>,
    pub auth: Arc<AuthService>,
    /// `None` when the response cache is disabled.
    pub cache: Option<Arc<PathCache>>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl HttpState {
    pub fn new(
        catalog: Arc<CatalogService>,
        auth: Arc<AuthService>,
        cache: Option<Arc<PathCache>>,
    ) -> Self {
        let verifier = auth.verifier();
        Self {
            catalog,
            auth,
            cache,
            verifier,
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    let catalog = Pipeline::allow([Method::GET])
        .cached(state.cache.clone())
        .wrap(catalog::routes());

    let auth = Pipeline::allow([Method::POST]).wrap(auth::routes());

    let admin = Pipeline::allow([Method::POST])
        .authenticated(state.verifier.clone())
        .wrap(admin::routes());

    let health = Pipeline::allow([Method::GET]).wrap(health::routes());

    catalog
        .merge(auth)
        .merge(admin)
        .merge(health)
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_requests))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn not_found() -> Response {
    message_response(StatusCode::NOT_FOUND, "Not found.")
}
