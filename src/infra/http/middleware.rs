use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, Request, StatusCode,
        header::{ALLOW, AUTHORIZATION, COOKIE},
    },
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::{
    auth::{AuthenticatedIdentity, CredentialVerifier, SESSION_COOKIE},
    error::{ErrorReport, message_response},
};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Log every request once the whole downstream chain has answered.
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if !(status.is_client_error() || status.is_server_error()) {
        info!(
            target: "morpho::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            request_id = request_id,
            "request served",
        );
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let (source, messages) = match report {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    if status.is_server_error() {
        error!(
            target: "morpho::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            source = source,
            detail = %detail,
            chain = ?messages,
            request_id = request_id,
            "request failed",
        );
    } else {
        warn!(
            target: "morpho::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            source = source,
            detail = %detail,
            chain = ?messages,
            request_id = request_id,
            "client request error",
        );
    }

    response
}

/// Allow-set of one route group, with its precomputed `Allow` header.
pub struct AllowedMethods {
    methods: Vec<Method>,
    header: HeaderValue,
}

impl AllowedMethods {
    pub fn new(methods: Vec<Method>) -> Self {
        let joined = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        // Method names are tokens, so the joined list is always a valid header value.
        let header = HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""));
        Self { methods, header }
    }

    pub fn permits(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn header(&self) -> &HeaderValue {
        &self.header
    }
}

pub async fn filter_methods(
    State(allowed): State<Arc<AllowedMethods>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if allowed.permits(request.method()) {
        return next.run(request).await;
    }

    let message = format!("Method {} not allowed.", request.method());
    let mut response = message_response(StatusCode::METHOD_NOT_ALLOWED, &message);
    response
        .headers_mut()
        .insert(ALLOW, allowed.header().clone());
    ErrorReport::from_message(
        "infra::http::filter_methods",
        StatusCode::METHOD_NOT_ALLOWED,
        message,
    )
    .attach(&mut response);
    response
}

pub async fn require_auth(
    State(verifier): State<Arc<dyn CredentialVerifier>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    const SOURCE: &str = "infra::http::require_auth";

    let Some(credential) = extract_credential(request.headers()) else {
        return unauthenticated(ErrorReport::from_message(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "no credential presented",
        ));
    };

    match verifier.verify(&credential) {
        Ok(Some(identity)) => {
            request
                .extensions_mut()
                .insert::<AuthenticatedIdentity>(identity);
            next.run(request).await
        }
        Ok(None) => unauthenticated(ErrorReport::from_message(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "credential rejected",
        )),
        Err(err) => unauthenticated(ErrorReport::from_error(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            &err,
        )),
    }
}

fn unauthenticated(report: ErrorReport) -> Response {
    let mut response = message_response(StatusCode::UNAUTHORIZED, "Not authenticated.");
    report.attach(&mut response);
    response
}

/// Bearer token first, then the session cookie.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_token_is_preferred_over_cookie() {
        let map = headers(&[
            ("authorization", "Bearer abc.def.ghi"),
            ("cookie", "morpho_session=from-cookie"),
        ]);
        assert_eq!(extract_credential(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let map = headers(&[("cookie", "theme=dark; morpho_session=tok; lang=en")]);
        assert_eq!(extract_credential(&map).as_deref(), Some("tok"));
    }

    #[test]
    fn missing_or_empty_credentials_yield_none() {
        assert_eq!(extract_credential(&HeaderMap::new()), None);
        assert_eq!(
            extract_credential(&headers(&[("authorization", "Basic Zm9vOmJhcg==")])),
            None
        );
        assert_eq!(
            extract_credential(&headers(&[("cookie", "morpho_session=")])),
            None
        );
    }

    #[test]
    fn allow_header_keeps_configured_order() {
        let allowed = AllowedMethods::new(vec![Method::POST, Method::GET]);
        assert_eq!(allowed.header(), "POST, GET");
        assert!(allowed.permits(&Method::GET));
        assert!(!allowed.permits(&Method::DELETE));
    }
}
