//! Referral handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::services::referral::{CreateReferralInput, ReferralQuery, ReferralStatusInput};
use crate::services::ReferralService;
use crate::AppState;

pub async fn list_case_referrals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Referral, Action::View)?;

    let referrals = ReferralService::new(state.db.clone())
        .list_for_case(case_id)
        .await?;
    Ok(Json(serde_json::json!({ "referrals": referrals })))
}

/// Referrals across all cases, optionally only the overdue ones
pub async fn list_referrals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReferralQuery>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Referral, Action::View)?;

    let referrals = ReferralService::new(state.db.clone())
        .list(&query, state.config.alerts.referral_response_days)
        .await?;
    Ok(Json(serde_json::json!({ "referrals": referrals })))
}

pub async fn create_referral(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<CreateReferralInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Referral, Action::Create)?;

    let referral = ReferralService::new(state.db.clone())
        .create(&user, case_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(referral)))
}

pub async fn change_referral_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(referral_id): Path<Uuid>,
    Json(input): Json<ReferralStatusInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Referral, Action::Edit)?;

    let referral = ReferralService::new(state.db.clone())
        .change_status(&user, referral_id, input)
        .await?;
    Ok(Json(referral))
}

pub async fn delete_referral(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(referral_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Referral, Action::Delete)?;

    ReferralService::new(state.db.clone())
        .delete(&user, referral_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
