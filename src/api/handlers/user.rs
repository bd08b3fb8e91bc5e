//! User directory handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::dto::{RegisterUserRequest, RegisterUserResponse};
use crate::app_state::AppState;
use crate::domain::{NewUser, Role, UserId, UserProfile};
use crate::error::{ErrorResponse, HealthPalError};

/// `POST /users` — Register a directory user.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-admins, invalid fields or a taken
/// email.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    summary = "Register a user",
    description = "Adds a patient, doctor, donor, NGO or admin to the directory. Email addresses are unique.",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterUserResponse),
        (status = 400, description = "Invalid name or email", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn register_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Admin])?;
    let profile = state
        .users
        .register(NewUser {
            full_name: req.full_name,
            email: req.email,
            phone: req.phone,
            role: req.role,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterUserResponse {
            user_id: profile.id,
        }),
    ))
}

/// `GET /users/{id}` — Look up a directory user.
///
/// # Errors
///
/// Returns [`HealthPalError`] when the caller is neither the user nor an
/// admin, or the user is unknown.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Get a user",
    params(
        ("id" = uuid::Uuid, Path, description = "User UUID"),
    ),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 403, description = "Not this user or an admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    let id = UserId::from_uuid(id);
    if user.id() != id && !user.0.is_admin() {
        return Err(HealthPalError::Forbidden(
            "profiles are visible to their owner and admins".to_string(),
        ));
    }
    let profile = state.users.get(id).await?;
    Ok(Json(profile))
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/{id}", get(get_user))
}
