//! Family composition handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::extract::{Json, Path};
use crate::middleware::CurrentUser;
use crate::services::family::{CreateFamilyMemberInput, UpdateFamilyMemberInput};
use crate::services::FamilyService;
use crate::AppState;

/// Family members and household income of a case
pub async fn get_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Family, Action::View) {
        return e.into_response();
    }

    let service = FamilyService::new(state.db.clone());
    match service.get_family(case_id).await {
        Ok(family) => (StatusCode::OK, Json(family)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn add_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<CreateFamilyMemberInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Family, Action::Create) {
        return e.into_response();
    }

    let service = FamilyService::new(state.db.clone());
    match service.add_member(&user, case_id, input).await {
        Ok(member) => (StatusCode::CREATED, Json(member)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(member_id): Path<Uuid>,
    Json(input): Json<UpdateFamilyMemberInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Family, Action::Edit) {
        return e.into_response();
    }

    let service = FamilyService::new(state.db.clone());
    match service.update_member(&user, member_id, input).await {
        Ok(member) => (StatusCode::OK, Json(member)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_family_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(member_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Family, Action::Delete) {
        return e.into_response();
    }

    let service = FamilyService::new(state.db.clone());
    match service.delete_member(&user, member_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
