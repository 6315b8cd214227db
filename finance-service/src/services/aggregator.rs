//! Bank-data aggregator client.
//!
//! [`Aggregator`] is the seam the sync core and link handlers talk to;
//! [`PlaidClient`] implements it against Plaid's JSON-over-POST API.
//! Amounts are returned in the aggregator's sign convention (spending is
//! positive); conversion to the ledger convention happens in the importer.

use crate::config::AggregatorConfig;
use crate::services::metrics::AGGREGATOR_CALL_DURATION;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Account types the service tracks; anything else is dropped at link time.
pub const SUPPORTED_ACCOUNT_TYPES: [&str; 3] = ["depository", "credit", "investment"];

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("aggregator call '{0}' timed out")]
    Timeout(&'static str),

    #[error("aggregator request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("aggregator returned {code}: {message}")]
    Api { code: String, message: String },

    #[error("unexpected aggregator response: {0}")]
    Decode(String),

    #[error("aggregator is not configured")]
    NotConfigured,
}

impl From<AggregatorError> for AppError {
    fn from(err: AggregatorError) -> Self {
        match err {
            AggregatorError::Timeout(_) => AppError::GatewayTimeout(err.to_string()),
            AggregatorError::NotConfigured => AppError::ServiceUnavailable,
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

/// Current balance of one provider account.
#[derive(Debug, Clone)]
pub struct ProviderBalance {
    pub account_id: String,
    pub current: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAccount {
    pub account_id: String,
    pub name: String,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    pub subtype: Option<String>,
    pub balances: ProviderAccountBalances,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAccountBalances {
    pub current: Option<Decimal>,
}

impl ProviderAccount {
    pub fn is_supported(&self) -> bool {
        SUPPORTED_ACCOUNT_TYPES.contains(&self.account_type.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTransaction {
    pub transaction_id: String,
    pub account_id: String,
    /// Positive is money out.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub name: String,
    pub merchant_name: Option<String>,
    pub original_description: Option<String>,
    #[serde(default)]
    pub category: Option<Vec<String>>,
    #[serde(default)]
    pub pending: bool,
}

/// Result of exchanging a public link token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    pub item_id: String,
}

#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError>;

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<TokenExchange, AggregatorError>;

    async fn get_institution_name(&self, access_token: &str) -> Result<String, AggregatorError>;

    async fn get_accounts(&self, access_token: &str)
        -> Result<Vec<ProviderAccount>, AggregatorError>;

    async fn get_current_balances(
        &self,
        access_token: &str,
    ) -> Result<Vec<ProviderBalance>, AggregatorError>;

    /// All transactions dated within `[start, end]`.
    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError>;
}

/// Run one aggregator call under a deadline, recording its duration.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, AggregatorError>
where
    F: Future<Output = Result<T, AggregatorError>>,
{
    let timer = AGGREGATOR_CALL_DURATION
        .with_label_values(&[operation])
        .start_timer();
    let result = tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| AggregatorError::Timeout(operation))?;
    timer.observe_duration();
    result
}

// ============================================================================
// Plaid
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlaidError {
    error_code: String,
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<ProviderAccount>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: Item,
}

#[derive(Debug, Deserialize)]
struct Item {
    institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionResponse {
    institution: InstitutionInfo,
}

#[derive(Debug, Deserialize)]
struct InstitutionInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<ProviderTransaction>,
    total_transactions: usize,
}

/// Plaid client for interacting with the Plaid API.
#[derive(Clone)]
pub struct PlaidClient {
    client: Client,
    config: AggregatorConfig,
}

impl PlaidClient {
    /// Create a new Plaid client.
    pub fn new(config: AggregatorConfig) -> Result<Self, AggregatorError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Check if Plaid is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.secret.expose_secret().is_empty()
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        mut body: Value,
    ) -> Result<T, AggregatorError> {
        if !self.is_configured() {
            return Err(AggregatorError::NotConfigured);
        }
        if let Value::Object(map) = &mut body {
            map.insert("client_id".into(), json!(self.config.client_id));
            map.insert("secret".into(), json!(self.config.secret.expose_secret()));
        }

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(path = %path, status = %status, "Plaid response");

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| AggregatorError::Decode(e.to_string()))
        } else {
            let error: PlaidError = serde_json::from_str(&text).unwrap_or_else(|_| PlaidError {
                error_code: status.as_str().to_string(),
                error_message: text.clone(),
            });
            tracing::warn!(
                path = %path,
                code = %error.error_code,
                message = %error.error_message,
                "Plaid API error"
            );
            Err(AggregatorError::Api {
                code: error.error_code,
                message: error.error_message,
            })
        }
    }
}

#[async_trait]
impl Aggregator for PlaidClient {
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError> {
        let response: LinkTokenResponse = self
            .post(
                "/link/token/create",
                json!({
                    "user": { "client_user_id": user_id.to_string() },
                    "client_name": self.config.client_name,
                    "products": ["transactions", "auth"],
                    "country_codes": ["US"],
                    "language": "en",
                    "account_filters": {
                        "depository": { "account_subtypes": ["checking", "savings", "money market", "cd"] },
                        "credit": { "account_subtypes": ["credit card"] },
                        "investment": { "account_subtypes": ["brokerage", "401k", "ira", "roth"] }
                    }
                }),
            )
            .await?;
        Ok(response.link_token)
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<TokenExchange, AggregatorError> {
        self.post(
            "/item/public_token/exchange",
            json!({ "public_token": public_token }),
        )
        .await
    }

    async fn get_institution_name(&self, access_token: &str) -> Result<String, AggregatorError> {
        let item: ItemResponse = self
            .post("/item/get", json!({ "access_token": access_token }))
            .await?;
        let institution_id = item
            .item
            .institution_id
            .ok_or_else(|| AggregatorError::Decode("item has no institution".to_string()))?;

        let institution: InstitutionResponse = self
            .post(
                "/institutions/get_by_id",
                json!({ "institution_id": institution_id, "country_codes": ["US"] }),
            )
            .await?;
        Ok(institution.institution.name)
    }

    async fn get_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<ProviderAccount>, AggregatorError> {
        let response: AccountsResponse = self
            .post("/accounts/get", json!({ "access_token": access_token }))
            .await?;
        Ok(response.accounts)
    }

    async fn get_current_balances(
        &self,
        access_token: &str,
    ) -> Result<Vec<ProviderBalance>, AggregatorError> {
        let response: AccountsResponse = self
            .post(
                "/accounts/balance/get",
                json!({ "access_token": access_token }),
            )
            .await?;
        Ok(response
            .accounts
            .into_iter()
            .map(|a| ProviderBalance {
                account_id: a.account_id,
                current: a.balances.current,
            })
            .collect())
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError> {
        let mut transactions = Vec::new();
        loop {
            let page: TransactionsResponse = self
                .post(
                    "/transactions/get",
                    json!({
                        "access_token": access_token,
                        "start_date": start.format("%Y-%m-%d").to_string(),
                        "end_date": end.format("%Y-%m-%d").to_string(),
                        "options": {
                            "count": self.config.page_size,
                            "offset": transactions.len(),
                        }
                    }),
                )
                .await?;

            let received = page.transactions.len();
            transactions.extend(page.transactions);
            if received == 0 || transactions.len() >= page.total_transactions {
                break;
            }
        }

        tracing::debug!(count = transactions.len(), "Fetched Plaid transactions");
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config(client_id: &str) -> AggregatorConfig {
        AggregatorConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            client_id: client_id.to_string(),
            secret: Secret::new("secret".to_string()),
            client_name: "Finance Tracker".to_string(),
            timeout: Duration::from_secs(1),
            page_size: 500,
        }
    }

    #[test]
    fn transaction_payload_parses() {
        let raw = r#"{
            "transaction_id": "t1",
            "account_id": "a1",
            "amount": 12.34,
            "date": "2024-03-05",
            "authorized_date": null,
            "name": "Uber 063015 SF**POOL**",
            "merchant_name": "Uber",
            "category": ["Travel", "Taxi"],
            "pending": false
        }"#;
        let txn: ProviderTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(txn.amount, Decimal::new(1234, 2));
        assert_eq!(txn.category.unwrap(), vec!["Travel", "Taxi"]);
        assert!(txn.original_description.is_none());
    }

    #[test]
    fn only_tracked_account_types_are_supported() {
        let raw = r#"{"account_id":"a","name":"Loan","official_name":null,"mask":"0000",
            "type":"loan","subtype":"student","balances":{"current":100}}"#;
        let account: ProviderAccount = serde_json::from_str(raw).unwrap();
        assert!(!account.is_supported());
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_calls() {
        let client = PlaidClient::new(config("")).unwrap();
        let err = client.get_accounts("token").await.unwrap_err();
        assert!(matches!(err, AggregatorError::NotConfigured));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), _> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AggregatorError::Timeout("slow"))));
    }

    #[test]
    fn errors_map_to_gateway_statuses() {
        let timeout: AppError = AggregatorError::Timeout("x").into();
        assert!(matches!(timeout, AppError::GatewayTimeout(_)));
        let api: AppError = AggregatorError::Api {
            code: "ITEM_LOGIN_REQUIRED".into(),
            message: "login".into(),
        }
        .into();
        assert!(matches!(api, AppError::BadGateway(_)));
    }
}
