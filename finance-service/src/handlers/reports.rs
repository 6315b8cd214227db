//! Dashboard endpoints.

use crate::middleware::AuthUser;
use crate::services::filter::parse_date;
use crate::services::reports::{
    month_bounds, net_worth_series, spend_summary, NetWorthSeries, SpendSummary,
    CHANGE_WINDOW_DAYS,
};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// `YYYY-MM`; defaults to the current month.
    pub month: Option<String>,
}

pub async fn net_worth(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<NetWorthSeries>, AppError> {
    let today = Utc::now().date_naive();
    let from = match query.from.as_deref() {
        Some(raw) => parse_date("from", raw)?,
        None => today - Duration::days(CHANGE_WINDOW_DAYS),
    };
    let to = match query.to.as_deref() {
        Some(raw) => parse_date("to", raw)?,
        None => today,
    };
    if from > to {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "'from' must not be after 'to'"
        )));
    }

    let balances = state
        .store
        .list_active_balances_between(user.user_id, from, to)
        .await?;
    let manual_assets = state.store.list_manual_assets(user.user_id).await?;

    Ok(Json(net_worth_series(&balances, &manual_assets, today)))
}

pub async fn spending(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SpendSummary>, AppError> {
    let month = query
        .month
        .unwrap_or_else(|| Utc::now().format("%Y-%m").to_string());
    let (start, end) = month_bounds(&month)?;

    let transactions = state
        .store
        .list_spending_transactions(user.user_id, start, end)
        .await?;

    Ok(Json(spend_summary(start, &transactions)))
}
