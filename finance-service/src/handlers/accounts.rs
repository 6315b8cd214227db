//! Account listing, activation and balance history.

use crate::middleware::AuthUser;
use crate::models::{Account, AccountOverview, BalanceSnapshot, ManualAsset};
use crate::services::filter::parse_date;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Account type and subtype under which manual assets are listed.
const MANUAL_TYPE: &str = "manual";
const MANUAL_SUBTYPE: &str = "crypto";

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub name: String,
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    pub subtype: Option<String>,
    pub institution_name: Option<String>,
    pub institution_status: Option<String>,
    pub balance: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl From<AccountOverview> for AccountView {
    fn from(overview: AccountOverview) -> Self {
        let last_updated = overview
            .balance_date
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(overview.account.created_utc);
        Self {
            id: overview.account.account_id,
            name: overview.account.name,
            mask: overview.account.mask,
            account_type: overview.account.account_type,
            subtype: overview.account.subtype,
            institution_name: overview.institution_name,
            institution_status: overview.institution_status,
            balance: overview.balance.unwrap_or(Decimal::ZERO),
            last_updated,
        }
    }
}

impl From<ManualAsset> for AccountView {
    fn from(asset: ManualAsset) -> Self {
        Self {
            id: asset.asset_id,
            name: asset.name,
            mask: None,
            account_type: MANUAL_TYPE.to_string(),
            subtype: Some(MANUAL_SUBTYPE.to_string()),
            institution_name: None,
            institution_status: None,
            balance: asset.current_value,
            last_updated: asset.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountView>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: Account,
}

#[derive(Debug, Default, Deserialize)]
pub struct BalanceRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub balances: Vec<BalanceSnapshot>,
}

/// Active linked accounts with their latest balance, followed by manual assets.
pub async fn list_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountsResponse>, AppError> {
    let overviews = state.store.list_account_overviews(user.user_id).await?;
    let manual_assets = state.store.list_manual_assets(user.user_id).await?;

    let accounts = overviews
        .into_iter()
        .map(AccountView::from)
        .chain(manual_assets.into_iter().map(AccountView::from))
        .collect();

    Ok(Json(AccountsResponse { accounts }))
}

pub async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .store
        .set_account_active(user.user_id, account_id, payload.is_active)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    tracing::info!(
        user_id = %user.user_id,
        account_id = %account_id,
        is_active = payload.is_active,
        "Account updated"
    );

    Ok(Json(AccountResponse { account }))
}

pub async fn account_balances(
    State(state): State<AppState>,
    user: AuthUser,
    Path(account_id): Path<Uuid>,
    Query(query): Query<BalanceRangeQuery>,
) -> Result<Json<BalancesResponse>, AppError> {
    state
        .store
        .get_account(user.user_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    let from = query.from.as_deref().map(|raw| parse_date("from", raw)).transpose()?;
    let to = query.to.as_deref().map(|raw| parse_date("to", raw)).transpose()?;

    let balances = state
        .store
        .list_snapshots(user.user_id, account_id, from, to)
        .await?;

    Ok(Json(BalancesResponse { balances }))
}
