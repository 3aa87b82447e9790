//! Audit log handlers

use axum::extract::State;
use shared::{Action, PaginatedResponse, Resource};

use crate::error::AppResult;
use crate::extract::{Json, Query};
use crate::middleware::CurrentUser;
use crate::services::audit::{AuditLogEntry, AuditLogFilter};
use crate::services::AuditService;
use crate::AppState;

/// Search the audit trail
pub async fn list_audit_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<AuditLogFilter>,
) -> AppResult<Json<PaginatedResponse<AuditLogEntry>>> {
    user.require(Resource::Audit, Action::View)?;

    let page = AuditService::new(state.db.clone()).list(&filter).await?;
    Ok(Json(page))
}
