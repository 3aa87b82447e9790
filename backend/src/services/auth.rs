//! Authentication service for login, token management and password changes

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{role_permissions, AuditAction, AuditEntity, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{BootstrapConfig, Config};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub name: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
}

impl UserRow {
    fn role(&self) -> AppResult<UserRole> {
        self.role
            .parse()
            .map_err(|e| AppError::Internal(format!("Stored user role is invalid: {}", e)))
    }
}

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        let email = email.trim().to_lowercase();

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, password_hash, name, role, is_active
            FROM users
            WHERE LOWER(email) = $1
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        let Some(user) = user else {
            self.record_failed_login(&email, "unknown_email").await?;
            return Err(AppError::InvalidCredentials);
        };

        if !user.is_active {
            self.record_failed_login(&email, "inactive").await?;
            return Err(AppError::Unauthorized {
                message: "Account is disabled".to_string(),
                message_pt: "Conta desativada".to_string(),
            });
        }

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            self.record_failed_login(&email, "wrong_password").await?;
            return Err(AppError::InvalidCredentials);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let role = user.role()?;
        let tokens = self.generate_tokens(user.id, &user.name, role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        audit::record(
            &self.db,
            &NewAuditEntry {
                user_id: Some(user.id),
                user_name: Some(user.name.clone()),
                action: AuditAction::Login,
                entity_type: AuditEntity::Session,
                entity_id: Some(user.id),
                details: serde_json::json!({}),
            },
        )
        .await?;

        tracing::info!(user_id = %user.id, "user logged in");

        Ok(tokens)
    }

    /// Refresh access token using refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = Self::hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        // Revoke and fetch in one statement so a token cannot be used twice
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            WITH revoked AS (
                UPDATE refresh_tokens
                SET revoked_at = NOW()
                WHERE token_hash = $1
                  AND expires_at > NOW()
                  AND revoked_at IS NULL
                RETURNING user_id
            )
            SELECT u.id, u.password_hash, u.name, u.role, u.is_active
            FROM revoked r
            JOIN users u ON u.id = r.user_id
            WHERE u.is_active = true
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_pt: "Token de renovação inválido ou expirado".to_string(),
        })?;

        let role = user.role()?;
        let tokens = self.generate_tokens(user.id, &user.name, role)?;

        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user.id)
        .bind(Self::hash_token(&tokens.refresh_token))
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke a refresh token belonging to the current user
    pub async fn logout(&self, user: &AuthUser, refresh_token: &str) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(Self::hash_token(refresh_token))
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(user, AuditAction::Logout, AuditEntity::Session, user.user_id),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Change the current user's password after checking the current one
    pub async fn change_password(
        &self,
        user: &AuthUser,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        shared::validate_password(new_password).map_err(|msg| {
            AppError::validation("new_password", msg, "A senha deve ter pelo menos 8 caracteres")
        })?;

        let password_hash =
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
                .bind(user.user_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let valid = verify(current_password, &password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&new_hash)
            .bind(user.user_id)
            .execute(&mut *tx)
            .await?;

        revoke_all_refresh_tokens(&mut tx, user.user_id).await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(
                user,
                AuditAction::PasswordChange,
                AuditEntity::User,
                user.user_id,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Create the first administrator when the users table is empty
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> AppResult<()> {
        let user_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        if user_count > 0 {
            return Ok(());
        }

        let (email, password) = match (&bootstrap.admin_email, &bootstrap.admin_password) {
            (Some(email), Some(password)) => (email, password),
            (None, None) => {
                tracing::warn!("No users exist and no bootstrap administrator is configured");
                return Ok(());
            }
            _ => {
                return Err(AppError::Configuration(
                    "bootstrap.admin_email and bootstrap.admin_password must be set together"
                        .to_string(),
                ))
            }
        };

        shared::validate_email(email)
            .map_err(|msg| AppError::Configuration(format!("bootstrap.admin_email: {}", msg)))?;
        shared::validate_password(password)
            .map_err(|msg| AppError::Configuration(format!("bootstrap.admin_password: {}", msg)))?;
        shared::validate_person_name(&bootstrap.admin_name)
            .map_err(|msg| AppError::Configuration(format!("bootstrap.admin_name: {}", msg)))?;

        let password_hash = hash_password(password)?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(bootstrap.admin_name.trim())
        .bind(email.trim().to_lowercase())
        .bind(&password_hash)
        .bind(UserRole::Admin.as_str())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%user_id, "Created bootstrap administrator");
        Ok(())
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, name: &str, role: UserRole) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            name: name.to_string(),
            role: role.as_str().to_string(),
            permissions: role_permissions(role),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (random, stored hashed)
        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let token_hash = Self::hash_token(token);
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn record_failed_login(&self, email: &str, reason: &str) -> AppResult<()> {
        tracing::warn!(%email, reason, "failed login attempt");
        audit::record(
            &self.db,
            &NewAuditEntry::anonymous(AuditAction::LoginFailed, AuditEntity::Session)
                .with_details(serde_json::json!({ "email": email, "reason": reason })),
        )
        .await
    }

    /// Hash a token for storage
    fn hash_token(token: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
    }
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Revoke every outstanding refresh token of a user
pub async fn revoke_all_refresh_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
