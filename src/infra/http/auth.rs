use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::{
    auth::{IssuedToken, SESSION_COOKIE},
    error::HttpError,
};

use super::HttpState;

const SOURCE: &str = "infra::http::auth";

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/auth/init/", post(init_login))
        .route("/auth/verify/", post(verify_login))
}

#[derive(Debug, Deserialize)]
struct InitLoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct VerifyLoginRequest {
    token: String,
    code: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
    expires_at: i64,
}

impl From<&IssuedToken> for TokenResponse {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            token: issued.token.clone(),
            expires_at: issued.expires_at.unix_timestamp(),
        }
    }
}

fn bad_body(rejection: JsonRejection) -> HttpError {
    HttpError::from_error(
        SOURCE,
        StatusCode::BAD_REQUEST,
        "Invalid request body.",
        &rejection,
    )
}

async fn init_login(
    State(state): State<HttpState>,
    payload: Result<Json<InitLoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, HttpError> {
    let Json(body) = payload.map_err(bad_body)?;
    let issued = state.auth.init_login(&body.username, &body.password).await?;
    info!(target: "morpho::auth", username = %body.username, "login code issued");
    Ok(Json(TokenResponse::from(&issued)))
}

async fn verify_login(
    State(state): State<HttpState>,
    payload: Result<Json<VerifyLoginRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(body) = payload.map_err(bad_body)?;
    let issued = state.auth.verify_login(&body.token, &body.code).await?;

    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Strict",
        issued.token,
        issued.max_age_secs()
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(|err| HttpError::internal(SOURCE, &err))?;

    let mut response = Json(TokenResponse::from(&issued)).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}
