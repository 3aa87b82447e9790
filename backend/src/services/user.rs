//! Staff account management

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{AuditAction, AuditEntity, User, UserRole};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::auth::{hash_password, revoke_all_refresh_tokens};

/// User service for staff accounts
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    phone: Option<String>,
    professional_registry: Option<String>,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = AppError;

    fn try_from(r: UserRecord) -> AppResult<Self> {
        Ok(User {
            id: r.id,
            role: r
                .role
                .parse()
                .map_err(|e| AppError::Internal(format!("Stored user role is invalid: {}", e)))?,
            name: r.name,
            email: r.email,
            phone: r.phone,
            professional_registry: r.professional_registry,
            is_active: r.is_active,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, role, phone, professional_registry, is_active, \
                            last_login_at, created_at, updated_at";

const LOCK_ACTIVE_ADMINS: &str =
    "SELECT id FROM users WHERE role = 'admin' AND is_active = true ORDER BY id FOR UPDATE";

/// Input for creating a user
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    /// Council registration (CRESS, CRP, OAB...)
    #[validate(length(max = 50))]
    pub professional_registry: Option<String>,
}

/// Partial update of a user
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 50))]
    pub professional_registry: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Query parameters for the user list
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

/// Reasons a change to an account would leave the system in a bad state
fn check_account_change(
    actor_id: Uuid,
    target_id: Uuid,
    current_role: UserRole,
    current_active: bool,
    input: &UpdateUserInput,
    active_admins: usize,
) -> AppResult<()> {
    let deactivating = current_active && input.is_active == Some(false);
    let role_change = input.role.filter(|r| *r != current_role);

    if actor_id == target_id {
        if deactivating {
            return Err(AppError::validation(
                "is_active",
                "You cannot deactivate your own account",
                "Você não pode desativar a sua própria conta",
            ));
        }
        if role_change.is_some() {
            return Err(AppError::validation(
                "role",
                "You cannot change your own role",
                "Você não pode alterar o seu próprio perfil",
            ));
        }
    }

    let loses_admin = current_role == UserRole::Admin
        && current_active
        && (deactivating || role_change.is_some());
    if loses_admin && active_admins <= 1 {
        return Err(AppError::validation(
            "role",
            "The last active administrator cannot be removed",
            "O último administrador ativo não pode ser removido",
        ));
    }

    Ok(())
}

fn validate_phone(phone: Option<&str>) -> AppResult<()> {
    if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
        shared::validate_br_phone(phone)
            .map_err(|msg| AppError::validation("phone", msg, "Telefone inválido"))?;
    }
    Ok(())
}

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List users, optionally by role and active flag
    pub async fn list_users(&self, query: &UserListQuery) -> AppResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(USER_COLUMNS).push(" FROM users WHERE 1 = 1");
        if let Some(role) = query.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(active) = query.active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY LOWER(name)");

        qb.build_query_as::<UserRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        User::try_from(record)
    }

    pub async fn create_user(&self, actor: &AuthUser, input: CreateUserInput) -> AppResult<User> {
        input.validate()?;
        shared::validate_person_name(&input.name)
            .map_err(|msg| AppError::validation("name", msg, "Nome inválido"))?;
        validate_phone(input.phone.as_deref())?;

        let email = input.email.trim().to_lowercase();

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = $1)",
        )
        .bind(&email)
        .fetch_one(&self.db)
        .await?;

        if exists {
            return Err(AppError::Conflict {
                resource: "email".to_string(),
                message: "Email already registered".to_string(),
                message_pt: "E-mail já cadastrado".to_string(),
            });
        }

        let password_hash = hash_password(&input.password)?;

        let mut tx = self.db.begin().await?;

        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, phone, professional_registry)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(input.role.as_str())
        .bind(&input.phone)
        .bind(&input.professional_registry)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::User, record.id)
                .with_details(serde_json::json!({ "email": email, "role": input.role })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %record.id, role = %input.role, "user created");
        User::try_from(record)
    }

    pub async fn update_user(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        input: UpdateUserInput,
    ) -> AppResult<User> {
        input.validate()?;
        if let Some(name) = &input.name {
            shared::validate_person_name(name)
                .map_err(|msg| AppError::validation("name", msg, "Nome inválido"))?;
        }
        validate_phone(input.phone.as_deref())?;

        let mut tx = self.db.begin().await?;

        // Lock the active administrators before the target so concurrent
        // demotions see each other's changes
        let active_admins = sqlx::query_scalar::<_, Uuid>(LOCK_ACTIVE_ADMINS)
        .fetch_all(&mut *tx)
        .await?
        .len();

        let current = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        let current = User::try_from(current)?;

        check_account_change(
            actor.user_id,
            user_id,
            current.role,
            current.is_active,
            &input,
            active_admins,
        )?;

        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                professional_registry = COALESCE($4, professional_registry),
                role = COALESCE($5, role),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.phone)
        .bind(&input.professional_registry)
        .bind(input.role.map(|r| r.as_str()))
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await?;

        if input.is_active == Some(false) {
            revoke_all_refresh_tokens(&mut tx, user_id).await?;
        }

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Update, AuditEntity::User, user_id)
                .with_details(serde_json::json!({
                    "role": input.role,
                    "is_active": input.is_active,
                })),
        )
        .await?;

        tx.commit().await?;

        User::try_from(record)
    }

    /// Set a new password for another user and end their sessions
    pub async fn reset_password(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        new_password: &str,
    ) -> AppResult<()> {
        shared::validate_password(new_password).map_err(|msg| {
            AppError::validation("new_password", msg, "A senha deve ter pelo menos 8 caracteres")
        })?;

        let password_hash = hash_password(new_password)?;

        let mut tx = self.db.begin().await?;

        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(&password_hash)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        revoke_all_refresh_tokens(&mut tx, user_id).await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::PasswordChange, AuditEntity::User, user_id)
                .with_details(serde_json::json!({ "reset": true })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "password reset");
        Ok(())
    }
}
