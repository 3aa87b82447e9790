//! PAF handlers

use axum::{extract::State, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path};
use crate::middleware::CurrentUser;
use crate::services::action_plan::SaveActionPlanInput;
use crate::services::ActionPlanService;
use crate::AppState;

pub async fn get_action_plan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::ActionPlan, Action::View)?;

    let plan = ActionPlanService::new(state.db.clone())
        .get_for_case(case_id)
        .await?;
    Ok(Json(plan))
}

/// Create the plan or replace its content
pub async fn save_action_plan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<SaveActionPlanInput>,
) -> AppResult<impl IntoResponse> {
    if !user.has_any_permission(&[
        (Resource::ActionPlan, Action::Create),
        (Resource::ActionPlan, Action::Edit),
    ]) {
        return Err(crate::error::AppError::InsufficientPermissions);
    }

    let plan = ActionPlanService::new(state.db.clone())
        .save(&user, case_id, input)
        .await?;
    Ok(Json(plan))
}
