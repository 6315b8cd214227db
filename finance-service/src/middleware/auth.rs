use crate::startup::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::error::AppError;
use uuid::Uuid;

/// The authenticated caller, taken from a `Bearer` session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
            })?;

        let claims = state.tokens.validate(token)?;
        Ok(AuthUser {
            user_id: claims.user_id()?,
            email: claims.email,
        })
    }
}
