use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    application::{auth::AuthError, catalog::CatalogError},
    config::LoadError,
    infra::error::InfraError,
};

pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// Failure envelope shared by every non-2xx JSON response.
#[derive(Debug, Serialize)]
pub struct ErrorMessage<'a> {
    pub message: &'a str,
}

pub fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorMessage { message })).into_response()
}

/// Diagnostic detail attached to a response for the request logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR,
            error,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = message_response(self.status, self.public_message);
        self.report.attach(&mut response);
        response
    }
}

impl From<CatalogError> for HttpError {
    fn from(error: CatalogError) -> Self {
        HttpError::internal("infra::http::catalog", &error)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(error: serde_json::Error) -> Self {
        HttpError::internal("infra::http::serialize", &error)
    }
}

impl From<AuthError> for HttpError {
    fn from(error: AuthError) -> Self {
        const SOURCE: &str = "infra::http::auth";
        match error {
            AuthError::Unavailable => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Authentication is not available.",
                &error,
            ),
            AuthError::InvalidCredentials => HttpError::from_error(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid username or password.",
                &error,
            ),
            AuthError::InvalidCode | AuthError::InvalidToken => HttpError::from_error(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid or expired code.",
                &error,
            ),
            AuthError::Signing(_)
            | AuthError::Hashing(_)
            | AuthError::Delivery(_)
            | AuthError::Repo(_) => HttpError::internal(SOURCE, &error),
        }
    }
}

/// Startup and shutdown failures of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::application::{aggregate::AggregateError, repos::RepoError};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn catalog_failure_hides_internal_detail() {
        let error = CatalogError::Aggregate(AggregateError::Repo(RepoError::from_persistence(
            "relation \"solution\" does not exist",
        )));
        let response = HttpError::from(error).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report attached");
        assert!(report.messages[0].contains("does not exist"));

        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "message": "Internal Server Error" }));
    }

    #[test]
    fn report_walks_the_error_chain() {
        let malformed = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        let error = AggregateError::MalformedFragment {
            column: "captions",
            source: malformed,
        };
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);

        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[0].contains("captions"));
    }

    #[test]
    fn login_failures_map_to_unauthorized() {
        assert_eq!(
            HttpError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HttpError::from(AuthError::InvalidCode).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HttpError::from(AuthError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HttpError::from(AuthError::Delivery("smtp down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
