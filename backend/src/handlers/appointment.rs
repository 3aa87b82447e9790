//! Agenda handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use shared::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::services::appointment::{
    AppointmentQuery, AppointmentStatusInput, CreateAppointmentInput, UpdateAppointmentInput,
};
use crate::services::AppointmentService;
use crate::AppState;

/// Agenda for a window, the next days by default
pub async fn list_appointments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AppointmentQuery>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::View)?;

    let appointments = AppointmentService::new(state.db.clone())
        .list(&user, &query, state.config.alerts.appointment_lookahead_days)
        .await?;
    Ok(Json(serde_json::json!({ "appointments": appointments })))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::View)?;

    let appointment = AppointmentService::new(state.db.clone())
        .get(appointment_id)
        .await?;
    Ok(Json(appointment))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateAppointmentInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::Create)?;

    let appointment = AppointmentService::new(state.db.clone())
        .create(&user, input)
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<Uuid>,
    Json(input): Json<UpdateAppointmentInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::Edit)?;

    let appointment = AppointmentService::new(state.db.clone())
        .update(&user, appointment_id, input)
        .await?;
    Ok(Json(appointment))
}

pub async fn change_appointment_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<Uuid>,
    Json(input): Json<AppointmentStatusInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::Edit)?;

    let appointment = AppointmentService::new(state.db.clone())
        .change_status(&user, appointment_id, input)
        .await?;
    Ok(Json(appointment))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Appointment, Action::Delete)?;

    AppointmentService::new(state.db.clone())
        .delete(&user, appointment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
