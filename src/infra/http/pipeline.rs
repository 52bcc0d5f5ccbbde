//! Composition of per-group middleware stages.
//!
//! A route group opts into stages in any order; `wrap` always layers them as
//! method filter, then authentication, then cache lookup, then the handler.

use std::sync::Arc;

use axum::{Router, http::Method, middleware};

use crate::application::auth::CredentialVerifier;
use crate::cache::{PathCache, serve_cached};

use super::middleware::{AllowedMethods, filter_methods, require_auth};

pub struct Pipeline {
    allowed: Vec<Method>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    cache: Option<Arc<PathCache>>,
}

impl Pipeline {
    pub fn allow(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            allowed: methods.into_iter().collect(),
            verifier: None,
            cache: None,
        }
    }

    pub fn authenticated(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Serve cached bodies for this group; `None` leaves the group uncached.
    pub fn cached(mut self, cache: Option<Arc<PathCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Later layers run first, so the innermost stage is added first.
        let mut router = router;
        if let Some(cache) = self.cache {
            router = router.layer(middleware::from_fn_with_state(cache, serve_cached));
        }
        if let Some(verifier) = self.verifier {
            router = router.layer(middleware::from_fn_with_state(verifier, require_auth));
        }
        router.layer(middleware::from_fn_with_state(
            Arc::new(AllowedMethods::new(self.allowed)),
            filter_methods,
        ))
    }
}
