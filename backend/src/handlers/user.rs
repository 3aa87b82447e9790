//! Staff account handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use shared::{Action, Resource};
use uuid::Uuid;

use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::services::user::{CreateUserInput, UpdateUserInput, UserListQuery};
use crate::services::UserService;
use crate::AppState;

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

/// List staff accounts
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserListQuery>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::User, Action::View) {
        return e.into_response();
    }

    let service = UserService::new(state.db.clone());
    match service.list_users(&query).await {
        Ok(users) => (StatusCode::OK, Json(serde_json::json!({ "users": users }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::User, Action::View) {
        return e.into_response();
    }

    let service = UserService::new(state.db.clone());
    match service.get_user(user_id).await {
        Ok(found) => (StatusCode::OK, Json(found)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::User, Action::Create) {
        return e.into_response();
    }

    let service = UserService::new(state.db.clone());
    match service.create_user(&user, input).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::User, Action::Edit) {
        return e.into_response();
    }

    let service = UserService::new(state.db.clone());
    match service.update_user(&user, user_id, input).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Set a new password for a user and end their sessions
pub async fn reset_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::User, Action::Edit) {
        return e.into_response();
    }

    let service = UserService::new(state.db.clone());
    match service.reset_password(&user, user_id, &body.new_password).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
