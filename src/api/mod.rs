// REST API endpoints for the gateway

mod extract;

pub use extract::{AdminPrincipal, ApiError};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, put},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{Authenticator, Principal, is_privileged};
use crate::directory::{DEFAULT_LIST_LIMIT, Directory, UserUpdate};

/// Shared state of the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub directory: Arc<dyn Directory>,
}

impl AppState {
    pub fn new(authenticator: Authenticator, directory: Arc<dyn Directory>) -> Self {
        Self {
            authenticator,
            directory,
        }
    }
}

/// CORS policy: permissive when no origins are configured, otherwise only
/// the listed origins, with credentials.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, http::header::InvalidHeaderValue> {
    if allowed_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-amz-date"),
            HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true))
}

pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/user", get(user_profile))
        .route(
            "/users",
            get(list_users).put(missing_user_id).delete(missing_user_id),
        )
        .route("/users/{username}", put(update_user).delete(delete_user))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=31536000; includeSubDomains"),
                )),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// Unmatched requests authenticate before answering.
async fn not_found(_: Principal) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Endpoint not found" })),
    )
}

async fn method_not_allowed(_: Principal) -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Method not allowed" })),
    )
}

/// Profile of the calling user: token identity merged with the directory
/// record.
async fn user_profile(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .directory
        .get_user(principal.username().as_str())
        .await
        .map_err(|e| {
            error!(subject = %principal.subject(), error = %e, "User profile lookup failed");
            ApiError::Internal("Failed to get user profile")
        })?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!(subject = %principal.subject(), "User profile requested");

    let email = if user.email.is_empty() {
        principal.email().to_string()
    } else {
        user.email.clone()
    };

    Ok(Json(serde_json::json!({
        "sub": principal.subject(),
        "username": principal.username(),
        "email": email,
        "emailVerified": user.email_verified,
        "name": user.name,
        "groups": principal.groups(),
        "isAdmin": is_privileged(&principal),
        "userStatus": user.status,
        "enabled": user.enabled,
        "createdAt": user.created_at,
        "lastModified": user.last_modified,
    })))
}

async fn list_users(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
) -> Result<Json<Value>, ApiError> {
    let users = state
        .directory
        .list_users(DEFAULT_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!(error = %e, "List users failed");
            ApiError::Internal("Failed to list users")
        })?;

    info!(admin = %admin.subject(), count = users.len(), "Listed users");

    Ok(Json(serde_json::json!({ "users": users })))
}

async fn update_user(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(username): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let update: UserUpdate = if body.is_empty() {
        UserUpdate::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest("Invalid request body"))?
    };

    state
        .directory
        .update_user(&username, &update)
        .await
        .map_err(|e| {
            error!(username = %username, error = %e, "Update user failed");
            ApiError::Internal("Failed to update user")
        })?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!(admin = %admin.subject(), username = %username, "User updated");

    Ok(Json(
        serde_json::json!({ "message": "User updated successfully" }),
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(username): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.directory.delete_user(&username).await.map_err(|e| {
        error!(username = %username, error = %e, "Delete user failed");
        ApiError::Internal("Failed to delete user")
    })?;

    if !deleted {
        return Err(ApiError::NotFound("User not found"));
    }

    info!(admin = %admin.subject(), username = %username, "User deleted");

    Ok(Json(
        serde_json::json!({ "message": "User deleted successfully" }),
    ))
}

async fn missing_user_id(AdminPrincipal(_): AdminPrincipal) -> ApiError {
    ApiError::BadRequest("User ID is required")
}
