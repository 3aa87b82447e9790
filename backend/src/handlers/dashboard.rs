//! Dashboard handlers

use axum::extract::State;
use serde::Deserialize;
use shared::{Action, Resource};

use crate::error::AppResult;
use crate::extract::{Json, Query};
use crate::middleware::CurrentUser;
use crate::services::dashboard::{DashboardAlerts, DashboardMetrics};
use crate::services::DashboardService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    pub mine: Option<bool>,
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<DashboardMetrics>> {
    user.require(Resource::Dashboard, Action::View)?;

    let service = DashboardService::new(state.db.clone(), state.config.alerts.clone());
    Ok(Json(service.metrics(&user).await?))
}

/// Stale cases, overdue referrals, plan reviews and upcoming appointments
pub async fn get_alerts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AlertsQuery>,
) -> AppResult<Json<DashboardAlerts>> {
    user.require(Resource::Dashboard, Action::View)?;

    let service = DashboardService::new(state.db.clone(), state.config.alerts.clone());
    Ok(Json(service.alerts(&user, query.mine.unwrap_or(false)).await?))
}
