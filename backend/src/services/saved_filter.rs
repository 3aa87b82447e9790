//! Named case filters saved by each user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{AuditAction, AuditEntity, CaseFilter};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};

/// Saved filter service
#[derive(Clone)]
pub struct SavedFilterService {
    db: PgPool,
}

/// A saved case filter
#[derive(Debug, Clone, Serialize)]
pub struct SavedFilter {
    pub id: Uuid,
    pub user_id: Uuid,
    pub owner_name: String,
    pub name: String,
    pub filters: CaseFilter,
    pub is_default: bool,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SavedFilterRecord {
    id: Uuid,
    user_id: Uuid,
    owner_name: String,
    name: String,
    filters: sqlx::types::Json<CaseFilter>,
    is_default: bool,
    is_shared: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SavedFilterRecord> for SavedFilter {
    fn from(r: SavedFilterRecord) -> Self {
        SavedFilter {
            id: r.id,
            user_id: r.user_id,
            owner_name: r.owner_name,
            name: r.name,
            filters: r.filters.0,
            is_default: r.is_default,
            is_shared: r.is_shared,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const FILTER_SELECT: &str = r#"
    SELECT f.id, f.user_id, u.name AS owner_name, f.name, f.filters, f.is_default,
           f.is_shared, f.created_at, f.updated_at
    FROM saved_filters f
    JOIN users u ON u.id = f.user_id"#;

/// Input for saving a filter
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSavedFilterInput {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    pub filters: CaseFilter,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_shared: bool,
}

/// Partial update of a saved filter
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSavedFilterInput {
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    pub filters: Option<CaseFilter>,
    pub is_default: Option<bool>,
    pub is_shared: Option<bool>,
}

impl CreateSavedFilterInput {
    /// Trim the name so length limits apply to what is stored
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self
    }
}

impl UpdateSavedFilterInput {
    fn normalized(mut self) -> Self {
        self.name = self.name.map(|n| n.trim().to_string());
        self
    }
}

fn check_filters(filters: &CaseFilter) -> AppResult<()> {
    filters
        .validate()
        .map_err(|msg| AppError::validation("filters", msg, "Filtro inválido"))
}

fn duplicate_name(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.constraint() == Some("saved_filters_user_id_name_key") => {
            AppError::Conflict {
                resource: "name".to_string(),
                message: "You already have a filter with this name".to_string(),
                message_pt: "Você já possui um filtro com este nome".to_string(),
            }
        }
        _ => AppError::DatabaseError(e),
    }
}

impl SavedFilterService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// The caller's filters plus filters others chose to share
    pub async fn list(&self, viewer: &AuthUser) -> AppResult<Vec<SavedFilter>> {
        let filters = sqlx::query_as::<_, SavedFilterRecord>(&format!(
            "{} WHERE f.user_id = $1 OR f.is_shared = true \
             ORDER BY (f.user_id = $1) DESC, f.is_default DESC, LOWER(f.name)",
            FILTER_SELECT
        ))
        .bind(viewer.user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(filters.into_iter().map(SavedFilter::from).collect())
    }

    pub async fn create(
        &self,
        owner: &AuthUser,
        input: CreateSavedFilterInput,
    ) -> AppResult<SavedFilter> {
        let input = input.normalized();
        input.validate()?;
        check_filters(&input.filters)?;

        let mut tx = self.db.begin().await?;

        if input.is_default {
            sqlx::query("UPDATE saved_filters SET is_default = false WHERE user_id = $1")
                .bind(owner.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let filter_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO saved_filters (user_id, name, filters, is_default, is_shared)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(owner.user_id)
        .bind(&input.name)
        .bind(sqlx::types::Json(&input.filters))
        .bind(input.is_default)
        .bind(input.is_shared)
        .fetch_one(&mut *tx)
        .await
        .map_err(duplicate_name)?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(owner, AuditAction::Create, AuditEntity::SavedFilter, filter_id),
        )
        .await?;

        let filter = sqlx::query_as::<_, SavedFilterRecord>(&format!(
            "{} WHERE f.id = $1",
            FILTER_SELECT
        ))
        .bind(filter_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(filter.into())
    }

    /// Update a filter owned by the caller; others' filters are reported as missing
    pub async fn update(
        &self,
        owner: &AuthUser,
        filter_id: Uuid,
        input: UpdateSavedFilterInput,
    ) -> AppResult<SavedFilter> {
        let input = input.normalized();
        input.validate()?;
        if let Some(filters) = &input.filters {
            check_filters(filters)?;
        }

        let mut tx = self.db.begin().await?;

        if input.is_default == Some(true) {
            sqlx::query(
                "UPDATE saved_filters SET is_default = false WHERE user_id = $1 AND id <> $2",
            )
            .bind(owner.user_id)
            .bind(filter_id)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE saved_filters SET
                name = COALESCE($3, name),
                filters = COALESCE($4, filters),
                is_default = COALESCE($5, is_default),
                is_shared = COALESCE($6, is_shared),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(filter_id)
        .bind(owner.user_id)
        .bind(&input.name)
        .bind(input.filters.as_ref().map(sqlx::types::Json))
        .bind(input.is_default)
        .bind(input.is_shared)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_name)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Saved filter".to_string()));
        }

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(owner, AuditAction::Update, AuditEntity::SavedFilter, filter_id),
        )
        .await?;

        let filter = sqlx::query_as::<_, SavedFilterRecord>(&format!(
            "{} WHERE f.id = $1",
            FILTER_SELECT
        ))
        .bind(filter_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(filter.into())
    }

    pub async fn delete(&self, owner: &AuthUser, filter_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM saved_filters WHERE id = $1 AND user_id = $2")
            .bind(filter_id)
            .bind(owner.user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Saved filter".to_string()));
        }

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(owner, AuditAction::Delete, AuditEntity::SavedFilter, filter_id),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CaseStatus;

    #[test]
    fn name_length_is_limited() {
        let input = CreateSavedFilterInput {
            name: "x".repeat(81),
            filters: CaseFilter::default(),
            is_default: false,
            is_shared: false,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn blank_names_are_rejected_after_trimming() {
        let input = CreateSavedFilterInput {
            name: "   ".to_string(),
            filters: CaseFilter::default(),
            is_default: false,
            is_shared: false,
        }
        .normalized();
        assert!(input.validate().is_err());

        let update = UpdateSavedFilterInput {
            name: Some(" \t ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert!(update.validate().is_err());
    }

    #[test]
    fn names_are_stored_trimmed() {
        let input = CreateSavedFilterInput {
            name: format!("  {}  ", "x".repeat(80)),
            filters: CaseFilter::default(),
            is_default: false,
            is_shared: false,
        }
        .normalized();
        assert!(input.validate().is_ok());
        assert_eq!(input.name.len(), 80);
    }

    #[test]
    fn stored_filters_are_checked() {
        let filters = CaseFilter {
            status: Some(CaseStatus::Paefi),
            intake_from: chrono::NaiveDate::from_ymd_opt(2026, 2, 1),
            intake_to: chrono::NaiveDate::from_ymd_opt(2026, 1, 1),
            ..Default::default()
        };
        assert!(check_filters(&filters).is_err());
    }

    #[test]
    fn flags_default_to_false() {
        let input: CreateSavedFilterInput =
            serde_json::from_str(r#"{"name":"Meus casos","filters":{"mine":true}}"#).unwrap();
        assert!(!input.is_default);
        assert!(!input.is_shared);
        assert_eq!(input.filters.mine, Some(true));
    }
}
