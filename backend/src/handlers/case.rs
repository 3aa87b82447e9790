//! Case handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, CaseFilter, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::services::case::{
    AssignTechnicianInput, ChangeStatusInput, CreateCaseInput, UpdateCaseInput,
};
use crate::services::CaseService;
use crate::AppState;

/// List cases with filters and pagination
pub async fn list_cases(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<CaseFilter>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::View)?;

    let page = CaseService::new(state.db.clone())
        .list_cases(&user, &filter)
        .await?;
    Ok(Json(page))
}

/// Case overview with household, plan and agenda
pub async fn get_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::View)?;

    let detail = CaseService::new(state.db.clone())
        .get_case_detail(case_id)
        .await?;
    Ok(Json(detail))
}

pub async fn create_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateCaseInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::Create)?;

    let case = CaseService::new(state.db.clone())
        .create_case(&user, input)
        .await?;
    Ok((StatusCode::CREATED, Json(case)))
}

pub async fn update_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<UpdateCaseInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::Edit)?;

    let case = CaseService::new(state.db.clone())
        .update_case(&user, case_id, input)
        .await?;
    Ok(Json(case))
}

pub async fn assign_technician(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<AssignTechnicianInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::Edit)?;

    let case = CaseService::new(state.db.clone())
        .assign_technician(&user, case_id, input.technician_id)
        .await?;
    Ok(Json(case))
}

/// Move a case through the workflow; discharging also needs `case:discharge`
pub async fn change_case_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<ChangeStatusInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::Edit)?;

    let case = CaseService::new(state.db.clone())
        .change_status(&user, case_id, input)
        .await?;
    Ok(Json(case))
}

pub async fn delete_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Case, Action::Delete)?;

    CaseService::new(state.db.clone())
        .delete_case(&user, case_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
