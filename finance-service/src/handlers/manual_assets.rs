//! Manually tracked assets (e.g. crypto holdings).

use crate::middleware::AuthUser;
use crate::models::{ManualAsset, ManualAssetUpdate};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateManualAssetRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub current_value: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateManualAssetRequest {
    #[validate(length(min = 1, max = 200, message = "Name must not be empty"))]
    pub name: Option<String>,
    pub current_value: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct ManualAssetResponse {
    pub manual_asset: ManualAsset,
}

#[derive(Debug, Serialize)]
pub struct ManualAssetListResponse {
    pub manual_assets: Vec<ManualAsset>,
}

fn ensure_non_negative(value: Decimal) -> Result<Decimal, AppError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "current_value must not be negative"
        )));
    }
    Ok(value)
}

pub async fn list_manual_assets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ManualAssetListResponse>, AppError> {
    let manual_assets = state.store.list_manual_assets(user.user_id).await?;
    Ok(Json(ManualAssetListResponse { manual_assets }))
}

pub async fn create_manual_asset(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateManualAssetRequest>,
) -> Result<(StatusCode, Json<ManualAssetResponse>), AppError> {
    payload.validate()?;
    let value = ensure_non_negative(payload.current_value)?;

    let manual_asset = state
        .store
        .create_manual_asset(user.user_id, payload.name.trim(), value)
        .await?;

    Ok((StatusCode::CREATED, Json(ManualAssetResponse { manual_asset })))
}

pub async fn update_manual_asset(
    State(state): State<AppState>,
    user: AuthUser,
    Path(asset_id): Path<Uuid>,
    Json(payload): Json<UpdateManualAssetRequest>,
) -> Result<Json<ManualAssetResponse>, AppError> {
    payload.validate()?;
    let update = ManualAssetUpdate {
        name: payload.name.map(|n| n.trim().to_string()),
        current_value: payload.current_value.map(ensure_non_negative).transpose()?,
    };

    let manual_asset = state
        .store
        .update_manual_asset(user.user_id, asset_id, update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Manual asset not found")))?;

    Ok(Json(ManualAssetResponse { manual_asset }))
}

pub async fn delete_manual_asset(
    State(state): State<AppState>,
    user: AuthUser,
    Path(asset_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_manual_asset(user.user_id, asset_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Manual asset not found")));
    }
    tracing::info!(user_id = %user.user_id, asset_id = %asset_id, "Manual asset deleted");
    Ok(StatusCode::NO_CONTENT)
}
