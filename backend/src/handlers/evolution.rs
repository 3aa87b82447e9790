//! Technical evolution handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::services::evolution::{CreateEvolutionInput, EvolutionQuery, UpdateEvolutionInput};
use crate::services::EvolutionService;
use crate::AppState;

/// Timeline of a case, filtered for the viewer
pub async fn list_evolutions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Query(query): Query<EvolutionQuery>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Evolution, Action::View)?;

    let page = EvolutionService::new(state.db.clone())
        .list_for_case(&user, case_id, &query)
        .await?;
    Ok(Json(page))
}

pub async fn get_evolution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(evolution_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Evolution, Action::View)?;

    let evolution = EvolutionService::new(state.db.clone())
        .get(&user, evolution_id)
        .await?;
    Ok(Json(evolution))
}

pub async fn create_evolution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<CreateEvolutionInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Evolution, Action::Create)?;

    let evolution = EvolutionService::new(state.db.clone())
        .create(&user, case_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(evolution)))
}

pub async fn update_evolution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(evolution_id): Path<Uuid>,
    Json(input): Json<UpdateEvolutionInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Evolution, Action::Edit)?;

    let evolution = EvolutionService::new(state.db.clone())
        .update(&user, evolution_id, input)
        .await?;
    Ok(Json(evolution))
}

pub async fn delete_evolution(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(evolution_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Evolution, Action::Delete)?;

    EvolutionService::new(state.db.clone())
        .delete(&user, evolution_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
