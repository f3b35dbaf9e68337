//! Request extractors and error responses.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http::request::Parts;
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::auth::{AuthError, Principal, require_admin};

impl FromRequestParts<AppState> for Principal {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = match parts.headers.get(header::AUTHORIZATION) {
            None => None,
            Some(value) => Some(value.to_str().map_err(|_| {
                AuthError::MalformedToken("authorization header is not visible ASCII".to_string())
            })?),
        };

        state.authenticator.authenticate(authorization).await
    }
}

/// A caller in the admin group.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;

        if let Err(err) = require_admin(&principal) {
            warn!(
                subject = %principal.subject(),
                path = %parts.uri.path(),
                "Admin route denied"
            );
            return Err(err);
        }

        Ok(Self(principal))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };

        let mut response = (status, Json(json!({ "error": self.public_message() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Handler failures past authentication.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    NotFound(&'static str),
    /// Upstream failure; the message names the operation, never the cause.
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
