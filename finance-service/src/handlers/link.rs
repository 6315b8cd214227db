//! Linking a bank through the aggregator's hosted flow.

use crate::middleware::AuthUser;
use crate::models::{NewAccount, NewInstitution, NewSnapshot, SnapshotSource};
use crate::services::aggregator::with_timeout;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct LinkTokenResponse {
    pub link_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExchangeRequest {
    #[validate(length(min = 1, message = "Public token required"))]
    pub public_token: String,
}

#[derive(Debug, Serialize)]
pub struct LinkedInstitution {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub name: String,
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    pub subtype: Option<String>,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub institution: LinkedInstitution,
    pub accounts: Vec<LinkedAccount>,
}

pub async fn create_link_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LinkTokenResponse>, AppError> {
    let link_token = with_timeout(
        "create_link_token",
        state.config.aggregator.timeout,
        state.aggregator.create_link_token(user.user_id),
    )
    .await?;

    Ok(Json(LinkTokenResponse { link_token }))
}

/// Exchange a public token, store the institution with its encrypted access
/// token, create its supported accounts and record today's balances.
pub async fn exchange_public_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ExchangeRequest>,
) -> Result<(StatusCode, Json<ExchangeResponse>), AppError> {
    payload.validate()?;
    let timeout = state.config.aggregator.timeout;

    let exchange = with_timeout(
        "exchange_public_token",
        timeout,
        state.aggregator.exchange_public_token(&payload.public_token),
    )
    .await?;
    let institution_name = with_timeout(
        "get_institution_name",
        timeout,
        state.aggregator.get_institution_name(&exchange.access_token),
    )
    .await?;
    let provider_accounts = with_timeout(
        "get_accounts",
        timeout,
        state.aggregator.get_accounts(&exchange.access_token),
    )
    .await?;

    let institution = state
        .store
        .create_institution(NewInstitution {
            user_id: user.user_id,
            item_id: exchange.item_id,
            access_token_encrypted: state.cipher.encrypt(&exchange.access_token)?,
            institution_name,
        })
        .await?;

    let today = Utc::now().date_naive();
    let mut accounts = Vec::new();
    for provider_account in provider_accounts.into_iter().filter(|a| a.is_supported()) {
        let account = state
            .store
            .create_account(NewAccount {
                user_id: user.user_id,
                institution_id: Some(institution.institution_id),
                provider_account_id: Some(provider_account.account_id),
                name: provider_account.name,
                official_name: provider_account.official_name,
                mask: provider_account.mask,
                account_type: provider_account.account_type,
                subtype: provider_account.subtype,
            })
            .await?;

        let balance = provider_account.balances.current.unwrap_or(Decimal::ZERO);
        state
            .store
            .write_snapshot(NewSnapshot {
                user_id: user.user_id,
                account_id: account.account_id,
                date: today,
                balance,
                source: SnapshotSource::Plaid,
            })
            .await?;

        accounts.push(LinkedAccount {
            id: account.account_id,
            name: account.name,
            mask: account.mask,
            account_type: account.account_type,
            subtype: account.subtype,
            balance,
        });
    }

    tracing::info!(
        user_id = %user.user_id,
        institution_id = %institution.institution_id,
        accounts = accounts.len(),
        "Institution linked"
    );

    Ok((
        StatusCode::CREATED,
        Json(ExchangeResponse {
            institution: LinkedInstitution {
                id: institution.institution_id,
                name: institution.institution_name,
            },
            accounts,
        }),
    ))
}
