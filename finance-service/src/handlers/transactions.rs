//! Transaction listing and user edits.

use crate::middleware::AuthUser;
use crate::models::{Transaction, TransactionUpdate, TransactionWithAccount};
use crate::services::{TransactionFilter, TransactionQuery};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Personal category, else first raw label, else `Other`.
    pub category: String,
    pub account_name: Option<String>,
    pub account_type: Option<String>,
}

impl From<TransactionWithAccount> for TransactionView {
    fn from(row: TransactionWithAccount) -> Self {
        Self {
            category: row.transaction.display_category().to_string(),
            transaction: row.transaction,
            account_name: Some(row.account_name),
            account_type: Some(row.account_type),
        }
    }
}

impl From<Transaction> for TransactionView {
    fn from(transaction: Transaction) -> Self {
        Self {
            category: transaction.display_category().to_string(),
            transaction,
            account_name: None,
            account_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionView>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    pub personal_category: Option<String>,
    pub merchant_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction: TransactionView,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let filter = TransactionFilter::try_from(query)?;
    let page = state.store.list_transactions(user.user_id, &filter).await?;

    Ok(Json(TransactionListResponse {
        transactions: page.items.into_iter().map(TransactionView::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

fn non_blank(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be empty",
            field
        ))),
        other => Ok(other),
    }
}

pub async fn update_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<UpdateTransactionRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    let update = TransactionUpdate {
        personal_category: non_blank("personal_category", payload.personal_category)?,
        merchant_name: non_blank("merchant_name", payload.merchant_name)?,
    };

    let transaction = state
        .store
        .update_transaction(user.user_id, transaction_id, update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    tracing::info!(
        user_id = %user.user_id,
        transaction_id = %transaction_id,
        "Transaction updated"
    );

    Ok(Json(TransactionResponse {
        transaction: TransactionView::from(transaction),
    }))
}
