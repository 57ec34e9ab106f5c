use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{validate_email, validate_name, validate_password};
use crate::config::AuthConfig;
use crate::db::{
    common::now,
    DbPool, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, User,
    UserEnvelope, UserResponse, UserRole,
};
use crate::AppState;

/// Cookie carrying the session token for browser clients
pub const TOKEN_COOKIE: &str = "token";

/// Session token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Informational only; authorization reloads the role from the user row.
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Sign a session token for `user`
pub fn issue_token(user: &User, config: &AuthConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::days(config.token_ttl_days)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verify signature and expiry of a session token
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Extract the token from the Authorization header or the session cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
}

/// Resolve the caller from request headers.
///
/// Returns `Ok(None)` for a missing, invalid or expired token, or when the
/// user no longer exists. The row is reloaded on every call so role changes
/// take effect without a new token.
pub async fn current_user(
    pool: &DbPool,
    config: &AuthConfig,
    headers: &HeaderMap,
) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_token(headers) else {
        return Ok(None);
    };
    let claims = match decode_token(&token, &config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected session token");
            return Ok(None);
        }
    };

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Extractor for getting the current authenticated user from a request
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        current_user(&state.db, &state.config.auth, &parts.headers)
            .await?
            .ok_or_else(ApiError::authentication_required)
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

async fn insert_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<User, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, last_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(&ts)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    let email = req.email.trim().to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    let role = match req.role.as_deref() {
        None | Some("") => UserRole::Student,
        Some(raw) => match raw.parse::<UserRole>() {
            Ok(role) if role.is_self_assignable() => role,
            _ => {
                errors.add("role", "Role must be student or instructor");
                UserRole::Student
            }
        },
    };
    errors.finish()?;

    if find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::validation_field("email", "User already exists"));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = match insert_user(&state.db, req.name.trim(), &email, &password_hash, role).await {
        Ok(user) => user,
        // Lost a race with another registration for the same address.
        Err(e) if crate::db::is_unique_violation(&e) => {
            return Err(ApiError::validation_field("email", "User already exists"))
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User registered successfully".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password_hash) {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    sqlx::query("UPDATE users SET last_active = ? WHERE id = ?")
        .bind(now())
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let token = issue_token(&user, &state.config.auth)
        .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))?;

    info!(user_id = %user.id, "User logged in");

    Ok((
        jar.add(session_cookie(token.clone())),
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));
    (jar, Json(json!({ "message": "Logged out successfully" })))
}

/// GET /api/auth/me
pub async fn me(user: User) -> Json<UserResponse> {
    Json(user.into())
}

/// PUT /api/auth/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(profile) = &req.profile {
        if profile.skills.iter().any(|s| s.trim().is_empty()) {
            errors.add("profile.skills", "Skills cannot be empty");
        }
    }
    errors.finish()?;

    let name = req.name.as_deref().map(str::trim).unwrap_or(&user.name);
    let image = req.image.clone().or_else(|| user.image.clone());
    let profile = match &req.profile {
        Some(p) => Some(serde_json::to_string(p).map_err(|e| ApiError::internal(e.to_string()))?),
        None => user.profile.clone(),
    };
    let preferences = match &req.preferences {
        Some(p) => Some(serde_json::to_string(p).map_err(|e| ApiError::internal(e.to_string()))?),
        None => user.preferences.clone(),
    };

    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, image = ?, profile = ?, preferences = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(&image)
    .bind(&profile)
    .bind(&preferences)
    .bind(now())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let updated: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(UserEnvelope {
        message: "Profile updated successfully".to_string(),
        user: updated.into(),
    }))
}

/// Create the configured bootstrap admin if it does not exist yet
pub async fn ensure_admin_user(pool: &DbPool, config: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    if let Some(existing) = find_by_email(pool, &email).await? {
        if !existing.role_enum().is_admin() {
            warn!(user_id = %existing.id, "Configured admin email belongs to a non-admin user");
        }
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let user = insert_user(pool, "Administrator", &email, &password_hash, UserRole::Admin).await?;
    info!(user_id = %user.id, "Created bootstrap admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_token_resolves_current_user() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "Ada", "ada@example.com", "h", UserRole::Instructor)
            .await
            .unwrap();
        let token = issue_token(&user, &config()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", format!("Bearer {}", token).parse().unwrap());
        let found = current_user(&pool, &config(), &headers).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let mut headers = HeaderMap::new();
        headers.insert("Cookie", format!("{}={}", TOKEN_COOKIE, token).parse().unwrap());
        assert!(current_user(&pool, &config(), &headers).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bad_tokens_resolve_to_nobody() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "Ada", "ada@example.com", "h", UserRole::Student)
            .await
            .unwrap();

        let mut other = config();
        other.jwt_secret = "ffffffffffffffffffffffffffffffff".to_string();
        let forged = issue_token(&user, &other).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", format!("Bearer {}", forged).parse().unwrap());
        assert!(current_user(&pool, &config(), &headers).await.unwrap().is_none());
        assert!(current_user(&pool, &config(), &HeaderMap::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let pool = test_pool().await;
        let mut cfg = config();
        cfg.admin_email = Some("Root@Example.com".to_string());
        cfg.admin_password = Some("hunter22".to_string());

        ensure_admin_user(&pool, &cfg).await.unwrap();
        ensure_admin_user(&pool, &cfg).await.unwrap();

        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
        let admin = find_by_email(&pool, "root@example.com").await.unwrap().unwrap();
        assert!(verify_password("hunter22", &admin.password_hash));
    }
}
