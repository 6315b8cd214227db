//! Registration and login.

use crate::models::{SyncFrequency, User};
use crate::services::{hash_password, verify_password};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// `daily` (default), `weekly` or `manual`.
    pub sync_frequency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn session(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    Ok(AuthResponse {
        token: state.tokens.issue(user.user_id, &user.email)?,
        token_type: "Bearer",
        expires_in: state.tokens.expires_in(),
        user,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let sync_frequency = match payload.sync_frequency.as_deref() {
        None => SyncFrequency::Daily,
        Some(raw) => SyncFrequency::from_str(raw).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "sync_frequency must be one of daily, weekly, manual"
            ))
        })?,
    };

    let email = normalize_email(&payload.email);
    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(&email, &password_hash, sync_frequency)
        .await?;

    tracing::info!(user_id = %user.user_id, sync_frequency = %sync_frequency, "User registered");

    Ok((StatusCode::CREATED, Json(session(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate()?;

    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"));

    let user = state
        .store
        .get_user_by_email(&normalize_email(&payload.email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash) {
        tracing::info!(user_id = %user.user_id, "Login rejected");
        return Err(invalid());
    }

    tracing::info!(user_id = %user.user_id, "User logged in");
    Ok(Json(session(&state, user)?))
}
