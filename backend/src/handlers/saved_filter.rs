//! Saved filter handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path};
use crate::middleware::CurrentUser;
use crate::services::saved_filter::{CreateSavedFilterInput, UpdateSavedFilterInput};
use crate::services::SavedFilterService;
use crate::AppState;

pub async fn list_saved_filters(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::SavedFilter, Action::View)?;

    let filters = SavedFilterService::new(state.db.clone()).list(&user).await?;
    Ok(Json(serde_json::json!({ "filters": filters })))
}

pub async fn create_saved_filter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSavedFilterInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::SavedFilter, Action::Create)?;

    let filter = SavedFilterService::new(state.db.clone())
        .create(&user, input)
        .await?;
    Ok((StatusCode::CREATED, Json(filter)))
}

pub async fn update_saved_filter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(filter_id): Path<Uuid>,
    Json(input): Json<UpdateSavedFilterInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::SavedFilter, Action::Edit)?;

    let filter = SavedFilterService::new(state.db.clone())
        .update(&user, filter_id, input)
        .await?;
    Ok(Json(filter))
}

pub async fn delete_saved_filter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(filter_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::SavedFilter, Action::Delete)?;

    SavedFilterService::new(state.db.clone())
        .delete(&user, filter_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
