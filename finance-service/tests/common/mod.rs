//! Common test utilities for finance-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use finance_service::config::{
    AggregatorConfig, AuthConfig, CredentialConfig, DatabaseConfig, FinanceConfig, StoreBackend,
    SyncConfig,
};
use finance_service::models::{
    Account, AccountOverview, BalanceSnapshot, DatedAccountBalance, Institution,
    InstitutionStatus, ManualAsset, ManualAssetUpdate, NewAccount, NewInstitution, NewSnapshot,
    NewTransaction, SnapshotWrite, SyncFrequency, Transaction, TransactionSummary,
    TransactionUpdate, User,
};
use finance_service::services::aggregator::ProviderAccountBalances;
use finance_service::services::{
    Aggregator, AggregatorError, CredentialCipher, MemoryStore, ProviderAccount, ProviderBalance,
    ProviderTransaction, Store, TokenExchange, TransactionFilter, TransactionPage,
};
use finance_service::startup::{build_router, AppState};
use finance_service::sync::SyncEngine;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,finance_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Memory-backed configuration with the scheduler off.
pub fn test_config() -> FinanceConfig {
    FinanceConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "finance-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: Secret::new(String::new()),
            max_connections: 2,
            min_connections: 1,
        },
        aggregator: AggregatorConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            client_id: "test-client".to_string(),
            secret: Secret::new("test-secret".to_string()),
            client_name: "Finance Tracker Test".to_string(),
            timeout: Duration::from_millis(200),
            page_size: 500,
        },
        credentials: CredentialConfig {
            encryption_key: Secret::new("test-encryption-key".to_string()),
        },
        auth: AuthConfig {
            jwt_secret: Secret::new("test-jwt-secret".to_string()),
            token_ttl_days: 7,
        },
        sync: SyncConfig {
            scheduler_enabled: false,
            ..SyncConfig::default()
        },
    }
}

pub fn day(year: i32, month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, d).unwrap()
}

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

// ============================================================================
// Scripted aggregator
// ============================================================================

#[derive(Default)]
struct Script {
    exchanges: HashMap<String, TokenExchange>,
    institution_names: HashMap<String, String>,
    accounts: HashMap<String, Vec<ProviderAccount>>,
    balances: HashMap<String, Vec<ProviderBalance>>,
    transactions: HashMap<String, Vec<ProviderTransaction>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
    transaction_windows: Vec<(NaiveDate, NaiveDate)>,
}

/// In-process [`Aggregator`] answering from per-access-token scripts.
#[derive(Default)]
pub struct MockAggregator {
    script: Mutex<Script>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a full link: public token, access token, institution and accounts.
    pub fn link(
        &self,
        public_token: &str,
        access_token: &str,
        institution_name: &str,
        accounts: Vec<ProviderAccount>,
    ) {
        let mut script = self.script.lock().unwrap();
        script.exchanges.insert(
            public_token.to_string(),
            TokenExchange {
                access_token: access_token.to_string(),
                item_id: format!("item-{}", access_token),
            },
        );
        script
            .institution_names
            .insert(access_token.to_string(), institution_name.to_string());
        script.accounts.insert(access_token.to_string(), accounts);
    }

    pub fn set_balances(&self, access_token: &str, balances: &[(&str, Option<Decimal>)]) {
        let balances = balances
            .iter()
            .map(|(account_id, current)| ProviderBalance {
                account_id: account_id.to_string(),
                current: *current,
            })
            .collect();
        self.script
            .lock()
            .unwrap()
            .balances
            .insert(access_token.to_string(), balances);
    }

    pub fn set_transactions(&self, access_token: &str, transactions: Vec<ProviderTransaction>) {
        self.script
            .lock()
            .unwrap()
            .transactions
            .insert(access_token.to_string(), transactions);
    }

    pub fn fail(&self, access_token: &str) {
        self.script
            .lock()
            .unwrap()
            .failing
            .insert(access_token.to_string());
    }

    /// Any call with this access token panics, taking its task down.
    pub fn panic_on(&self, access_token: &str) {
        self.script
            .lock()
            .unwrap()
            .panicking
            .insert(access_token.to_string());
    }

    pub fn delay(&self, access_token: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(access_token.to_string(), delay);
    }

    /// Date windows requested through `get_transactions`, in call order.
    pub fn transaction_windows(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.script.lock().unwrap().transaction_windows.clone()
    }

    async fn gate(&self, access_token: &str) -> Result<(), AggregatorError> {
        let (delay, failing, panicking) = {
            let script = self.script.lock().unwrap();
            (
                script.delays.get(access_token).copied(),
                script.failing.contains(access_token),
                script.panicking.contains(access_token),
            )
        };
        if panicking {
            panic!("scripted panic for {}", access_token);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(AggregatorError::Api {
                code: "ITEM_LOGIN_REQUIRED".to_string(),
                message: "the login details of this item have changed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Aggregator for MockAggregator {
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError> {
        Ok(format!("link-sandbox-{}", user_id))
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<TokenExchange, AggregatorError> {
        self.gate(public_token).await?;
        self.script
            .lock()
            .unwrap()
            .exchanges
            .get(public_token)
            .cloned()
            .ok_or_else(|| AggregatorError::Api {
                code: "INVALID_PUBLIC_TOKEN".to_string(),
                message: "unknown public token".to_string(),
            })
    }

    async fn get_institution_name(&self, access_token: &str) -> Result<String, AggregatorError> {
        self.gate(access_token).await?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .institution_names
            .get(access_token)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn get_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<ProviderAccount>, AggregatorError> {
        self.gate(access_token).await?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .accounts
            .get(access_token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_current_balances(
        &self,
        access_token: &str,
    ) -> Result<Vec<ProviderBalance>, AggregatorError> {
        self.gate(access_token).await?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .balances
            .get(access_token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError> {
        self.gate(access_token).await?;
        let mut script = self.script.lock().unwrap();
        script.transaction_windows.push((start, end));
        Ok(script
            .transactions
            .get(access_token)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn provider_account(
    account_id: &str,
    name: &str,
    account_type: &str,
    current: Option<Decimal>,
) -> ProviderAccount {
    ProviderAccount {
        account_id: account_id.to_string(),
        name: name.to_string(),
        official_name: None,
        mask: Some("0000".to_string()),
        account_type: account_type.to_string(),
        subtype: None,
        balances: ProviderAccountBalances { current },
    }
}

/// A provider transaction; `amount` is in the aggregator convention (spending positive).
pub fn provider_txn(
    transaction_id: &str,
    account_id: &str,
    amount: &str,
    date: NaiveDate,
    name: &str,
    category: &[&str],
) -> ProviderTransaction {
    ProviderTransaction {
        transaction_id: transaction_id.to_string(),
        account_id: account_id.to_string(),
        amount: dec(amount),
        date,
        authorized_date: None,
        name: name.to_string(),
        merchant_name: None,
        original_description: None,
        category: if category.is_empty() {
            None
        } else {
            Some(category.iter().map(|c| c.to_string()).collect())
        },
        pending: false,
    }
}

// ============================================================================
// Sync harness
// ============================================================================

pub struct SyncHarness {
    pub store: Arc<MemoryStore>,
    /// What the engine talks to: `store` plus injected failures.
    pub faults: Arc<FaultyStore>,
    pub aggregator: Arc<MockAggregator>,
    pub cipher: CredentialCipher,
    pub engine: SyncEngine,
}

impl SyncHarness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(200))
    }

    pub fn with_timeout(call_timeout: Duration) -> Self {
        init_tracing();
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let aggregator = Arc::new(MockAggregator::new());
        let cipher = CredentialCipher::new(&config.credentials.encryption_key);
        let engine = SyncEngine::new(
            faults.clone(),
            aggregator.clone(),
            cipher.clone(),
            call_timeout,
            &config.sync,
        );
        Self {
            store,
            faults,
            aggregator,
            cipher,
            engine,
        }
    }

    pub async fn user(&self, frequency: SyncFrequency) -> Uuid {
        seed_user(self.store.as_ref(), frequency).await
    }

    pub async fn institution(&self, user_id: Uuid, access_token: &str) -> Institution {
        self.store
            .create_institution(NewInstitution {
                user_id,
                item_id: format!("item-{}", access_token),
                access_token_encrypted: self.cipher.encrypt(access_token).unwrap(),
                institution_name: format!("Bank {}", access_token),
            })
            .await
            .unwrap()
    }

    pub async fn account(
        &self,
        user_id: Uuid,
        institution: &Institution,
        provider_account_id: &str,
        account_type: &str,
    ) -> Account {
        self.store
            .create_account(NewAccount {
                user_id,
                institution_id: Some(institution.institution_id),
                provider_account_id: Some(provider_account_id.to_string()),
                name: format!("Account {}", provider_account_id),
                official_name: None,
                mask: Some("1234".to_string()),
                account_type: account_type.to_string(),
                subtype: None,
            })
            .await
            .unwrap()
    }
}

pub async fn seed_user(store: &dyn Store, frequency: SyncFrequency) -> Uuid {
    store
        .create_user(
            &format!("{}@example.com", Uuid::new_v4()),
            "not-a-real-hash",
            frequency,
        )
        .await
        .unwrap()
        .user_id
}

// ============================================================================
// Store with injected failures
// ============================================================================

/// Delegates to a [`MemoryStore`] except where a failure has been injected.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    unlistable_users: Mutex<HashSet<Uuid>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            unlistable_users: Mutex::new(HashSet::new()),
        }
    }

    /// Listing this user's institutions fails from now on.
    pub fn break_institution_listing(&self, user_id: Uuid) {
        self.unlistable_users.lock().unwrap().insert(user_id);
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.inner.health_check().await
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        sync_frequency: SyncFrequency,
    ) -> Result<User, AppError> {
        self.inner.create_user(email, password_hash, sync_frequency).await
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.inner.get_user_by_email(email).await
    }

    async fn list_user_ids_by_frequency(
        &self,
        frequency: SyncFrequency,
    ) -> Result<Vec<Uuid>, AppError> {
        self.inner.list_user_ids_by_frequency(frequency).await
    }

    async fn create_institution(&self, new: NewInstitution) -> Result<Institution, AppError> {
        self.inner.create_institution(new).await
    }

    async fn list_active_institutions(&self, user_id: Uuid) -> Result<Vec<Institution>, AppError> {
        if self.unlistable_users.lock().unwrap().contains(&user_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "connection reset while listing institutions"
            )));
        }
        self.inner.list_active_institutions(user_id).await
    }

    async fn set_institution_status(
        &self,
        institution_id: Uuid,
        status: InstitutionStatus,
    ) -> Result<(), AppError> {
        self.inner.set_institution_status(institution_id, status).await
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, AppError> {
        self.inner.create_account(new).await
    }

    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        self.inner.get_account(user_id, account_id).await
    }

    async fn list_active_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError> {
        self.inner.list_active_accounts(user_id).await
    }

    async fn list_active_institution_accounts(
        &self,
        institution_id: Uuid,
    ) -> Result<Vec<Account>, AppError> {
        self.inner.list_active_institution_accounts(institution_id).await
    }

    async fn list_account_overviews(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<AccountOverview>, AppError> {
        self.inner.list_account_overviews(user_id).await
    }

    async fn set_account_active(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        is_active: bool,
    ) -> Result<Option<Account>, AppError> {
        self.inner.set_account_active(user_id, account_id, is_active).await
    }

    async fn get_snapshot(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, AppError> {
        self.inner.get_snapshot(user_id, account_id, date).await
    }

    async fn write_snapshot(&self, snapshot: NewSnapshot) -> Result<SnapshotWrite, AppError> {
        self.inner.write_snapshot(snapshot).await
    }

    async fn latest_snapshot(&self, account_id: Uuid) -> Result<Option<BalanceSnapshot>, AppError> {
        self.inner.latest_snapshot(account_id).await
    }

    async fn list_snapshots(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>, AppError> {
        self.inner.list_snapshots(user_id, account_id, from, to).await
    }

    async fn list_active_balances_between(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DatedAccountBalance>, AppError> {
        self.inner.list_active_balances_between(user_id, from, to).await
    }

    async fn transaction_exists(&self, provider_transaction_id: &str) -> Result<bool, AppError> {
        self.inner.transaction_exists(provider_transaction_id).await
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<bool, AppError> {
        self.inner.insert_transaction(new).await
    }

    async fn list_transaction_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionSummary>, AppError> {
        self.inner.list_transaction_summaries(user_id).await
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, AppError> {
        self.inner.list_transactions(user_id, filter).await
    }

    async fn list_spending_transactions(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        self.inner.list_spending_transactions(user_id, from, to).await
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>, AppError> {
        self.inner.update_transaction(user_id, transaction_id, update).await
    }

    async fn list_manual_assets(&self, user_id: Uuid) -> Result<Vec<ManualAsset>, AppError> {
        self.inner.list_manual_assets(user_id).await
    }

    async fn create_manual_asset(
        &self,
        user_id: Uuid,
        name: &str,
        current_value: Decimal,
    ) -> Result<ManualAsset, AppError> {
        self.inner.create_manual_asset(user_id, name, current_value).await
    }

    async fn update_manual_asset(
        &self,
        user_id: Uuid,
        asset_id: Uuid,
        update: ManualAssetUpdate,
    ) -> Result<Option<ManualAsset>, AppError> {
        self.inner.update_manual_asset(user_id, asset_id, update).await
    }

    async fn delete_manual_asset(&self, user_id: Uuid, asset_id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_manual_asset(user_id, asset_id).await
    }
}

// ============================================================================
// HTTP harness
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub aggregator: Arc<MockAggregator>,
}

/// Router over a fresh memory store and a scripted aggregator.
pub fn spawn_app() -> TestApp {
    init_tracing();
    let aggregator = Arc::new(MockAggregator::new());
    let state = AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        aggregator.clone(),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
        aggregator,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Register a fresh user and return its session token and id.
    pub async fn register(&self) -> (String, Uuid) {
        let email = format!("{}@example.com", Uuid::new_v4());
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({ "email": email, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let token = body["token"].as_str().unwrap().to_string();
        let user_id = body["user"]["user_id"].as_str().unwrap().parse().unwrap();
        (token, user_id)
    }
}
