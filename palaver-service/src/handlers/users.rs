use axum::{extract::State, routing::post, Json, Router};
use palaver_state::types::User;
use palaver_utils::generate_token;
use tracing::{info, instrument};
use utoipa::OpenApi;

use crate::{
    error::{ErrorResponse, PalaverServiceError},
    handlers::{messages::delete_chat_history, Result},
    server::AppState,
    types::{CreateUserRequest, TokenRequest},
};

pub const USERS_PATH: &str = "/users";

#[derive(OpenApi)]
#[openapi(
    paths(create_user, delete_user),
    components(schemas(CreateUserRequest, TokenRequest, User, ErrorResponse))
)]
pub(crate) struct UsersOpenApi;

/// Router for user registration and removal
pub fn users_router() -> Router<AppState> {
    Router::new().route(USERS_PATH, post(create_user).delete(delete_user))
}

/// Registers a new user and issues its token.
///
/// The username check and the insert run under the database write lock, so
/// concurrent registrations are serialized. The `UNIQUE` constraint on the
/// users table backs the check.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = OK, description = "User created", body = User),
        (status = BAD_REQUEST, description = "Username already registered", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(level = "info", skip_all, fields(endpoint = USERS_PATH, username = %request.username))]
pub async fn create_user(
    State(app_state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>> {
    let to_error = |e| PalaverServiceError::from_state(e, USERS_PATH);
    info!(
        target = "palaver-service",
        event = "create-user",
        username = %request.username,
        "Creating user"
    );

    let mut session = app_state.state.write_session().await.map_err(to_error)?;
    if session
        .get_user_by_username(&request.username)
        .await
        .map_err(to_error)?
        .is_some()
    {
        return Err(PalaverServiceError::UsernameAlreadyRegistered {
            username: request.username,
            endpoint: USERS_PATH.to_string(),
        });
    }

    let user = session
        .insert_new_user(&request.username, &generate_token())
        .await
        .map_err(to_error)?;
    session.commit().await.map_err(to_error)?;

    info!(
        target = "palaver-service",
        event = "user-created",
        user_id = user.id,
        username = %user.username,
        "User created"
    );
    Ok(Json(user))
}

/// Deletes the user owning the token, together with its whole chat history.
#[utoipa::path(
    delete,
    path = "/users",
    tag = "Users",
    request_body = TokenRequest,
    responses(
        (status = OK, description = "User deleted", body = String),
        (status = BAD_REQUEST, description = "User not found", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(level = "info", skip_all, fields(endpoint = USERS_PATH))]
pub async fn delete_user(
    State(app_state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<String>> {
    let to_error = |e| PalaverServiceError::from_state(e, USERS_PATH);

    let mut session = app_state.state.write_session().await.map_err(to_error)?;
    let user = session
        .get_user_by_token(&request.token)
        .await
        .map_err(to_error)?
        .ok_or_else(|| PalaverServiceError::UserNotFound {
            endpoint: USERS_PATH.to_string(),
        })?;

    info!(
        target = "palaver-service",
        event = "delete-user",
        user_id = user.id,
        username = %user.username,
        "User found, proceeding with deletion"
    );
    delete_chat_history(&mut session, user.id)
        .await
        .map_err(to_error)?;
    session.delete_user(user.id).await.map_err(to_error)?;
    session.commit().await.map_err(to_error)?;

    info!(
        target = "palaver-service",
        event = "user-deleted",
        username = %user.username,
        "User deleted and all messages removed"
    );
    Ok(Json(format!("User {} deleted successfully", user.username)))
}
