//! Report handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use shared::{Action, CaseFilter, Resource};

use crate::extract::{Json, Query};
use crate::middleware::CurrentUser;
use crate::services::report::MonthlyReportQuery;
use crate::services::ReportService;
use crate::AppState;

/// Monthly activity statistics
pub async fn monthly_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<MonthlyReportQuery>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Report, Action::View) {
        return e.into_response();
    }

    let service = ReportService::new(state.db.clone());
    match service.monthly(&query).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Export filtered cases as CSV
pub async fn export_cases_csv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<CaseFilter>,
) -> impl IntoResponse {
    if let Err(e) = user.require(Resource::Report, Action::Export) {
        return e.into_response();
    }

    let service = ReportService::new(state.db.clone());
    match service.export_cases_csv(&user, &filter).await {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"casos.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
