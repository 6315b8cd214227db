use crate::middleware::AuthUser;
use crate::startup::AppState;
use crate::sync::UserSyncReport;
use axum::{extract::State, Json};
use chrono::Utc;
use service_core::error::AppError;

/// Sync the caller's institutions now, regardless of their cadence.
pub async fn sync_now(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserSyncReport>, AppError> {
    tracing::info!(user_id = %user.user_id, "Manual sync requested");
    let report = state
        .sync
        .sync_user_exclusive(user.user_id, Utc::now().date_naive())
        .await;
    Ok(Json(report))
}
