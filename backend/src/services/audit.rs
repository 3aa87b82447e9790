//! Audit log service
//!
//! Every mutation in the platform records who did what to which record.
//! Entries are written with the caller's executor so they commit or roll
//! back together with the change they describe.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{AuditAction, AuditEntity, PaginatedResponse, Pagination};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Audit log service
#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
}

/// An entry about to be written
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub action: AuditAction,
    pub entity_type: AuditEntity,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    /// Entry attributed to an authenticated user
    pub fn by(
        user: &AuthUser,
        action: AuditAction,
        entity_type: AuditEntity,
        entity_id: Uuid,
    ) -> Self {
        Self {
            user_id: Some(user.user_id),
            user_name: Some(user.name.clone()),
            action,
            entity_type,
            entity_id: Some(entity_id),
            details: serde_json::json!({}),
        }
    }

    /// Entry without an authenticated user (e.g., failed logins)
    pub fn anonymous(action: AuditAction, entity_type: AuditEntity) -> Self {
        Self {
            user_id: None,
            user_name: None,
            action,
            entity_type,
            entity_id: None,
            details: serde_json::json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// A stored audit entry
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit log query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub entity_type: Option<AuditEntity>,
    pub entity_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    /// Inclusive start date
    pub from: Option<NaiveDate>,
    /// Inclusive end date
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Write an audit entry using any executor (pool or open transaction)
pub async fn record<'e, E>(executor: E, entry: &NewAuditEntry) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, user_name, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.user_id)
    .bind(&entry.user_name)
    .bind(entry.action.as_str())
    .bind(entry.entity_type.as_str())
    .bind(entry.entity_id)
    .bind(&entry.details)
    .execute(executor)
    .await?;

    Ok(())
}

/// Append the WHERE clause for an audit filter; conditions combine with AND
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditLogFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(entity_type) = filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type.as_str());
    }
    if let Some(entity_id) = filter.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id);
    }
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from).push("::date");
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < ")
            .push_bind(to)
            .push("::date + INTERVAL '1 day'");
    }
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List entries, newest first
    pub async fn list(
        &self,
        filter: &AuditLogFilter,
    ) -> AppResult<PaginatedResponse<AuditLogEntry>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::validation(
                    "from",
                    "Start date must not be after end date",
                    "A data inicial não pode ser posterior à data final",
                ));
            }
        }

        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, user_name, action, entity_type, entity_id, details, created_at FROM audit_logs",
        );
        push_filters(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let entries = query
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(
            entries,
            pagination,
            u64::try_from(total).unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(filter: &AuditLogFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn empty_filter_has_no_conditions() {
        assert_eq!(
            sql_for(&AuditLogFilter::default()),
            "SELECT COUNT(*) FROM audit_logs WHERE 1 = 1"
        );
    }

    #[test]
    fn filters_combine_with_and() {
        let filter = AuditLogFilter {
            user_id: Some(Uuid::new_v4()),
            entity_type: Some(AuditEntity::Case),
            action: Some(AuditAction::StatusChange),
            ..Default::default()
        };
        let sql = sql_for(&filter);
        assert!(sql.contains("AND user_id = $1"));
        assert!(sql.contains("AND entity_type = $2"));
        assert!(sql.contains("AND action = $3"));
        assert!(!sql.contains("entity_id"));
    }

    #[test]
    fn date_range_is_inclusive() {
        let filter = AuditLogFilter {
            from: NaiveDate::from_ymd_opt(2026, 1, 1),
            to: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..Default::default()
        };
        let sql = sql_for(&filter);
        assert!(sql.contains("created_at >= $1::date"));
        assert!(sql.contains("created_at < $2::date + INTERVAL '1 day'"));
    }
}
