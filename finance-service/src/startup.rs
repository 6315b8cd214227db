//! Application startup and lifecycle management.

use crate::config::{FinanceConfig, StoreBackend};
use crate::handlers::{
    accounts, auth, health, link, manual_assets, reports, sync as sync_handlers, transactions,
};
use crate::middleware::metrics_middleware;
use crate::services::{
    init_metrics, Aggregator, CredentialCipher, Database, MemoryStore, PlaidClient, Store,
    TokenService,
};
use crate::sync::{SyncEngine, SyncScheduler};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FinanceConfig>,
    pub store: Arc<dyn Store>,
    pub aggregator: Arc<dyn Aggregator>,
    pub cipher: CredentialCipher,
    pub tokens: TokenService,
    pub sync: SyncEngine,
}

impl AppState {
    pub fn new(
        config: FinanceConfig,
        store: Arc<dyn Store>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        let cipher = CredentialCipher::new(&config.credentials.encryption_key);
        let tokens = TokenService::new(&config.auth);
        let sync = SyncEngine::new(
            store.clone(),
            aggregator.clone(),
            cipher.clone(),
            config.aggregator.timeout,
            &config.sync,
        );
        Self {
            config: Arc::new(config),
            store,
            aggregator,
            cipher,
            tokens,
            sync,
        }
    }
}

/// HTTP routes with the request id, metrics and trace layers applied.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/link/token", post(link::create_link_token))
        .route("/link/exchange", post(link::exchange_public_token))
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/:id", patch(accounts::update_account))
        .route("/accounts/:id/balances", get(accounts::account_balances))
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/:id", patch(transactions::update_transaction))
        .route(
            "/manual-assets",
            get(manual_assets::list_manual_assets).post(manual_assets::create_manual_asset),
        )
        .route(
            "/manual-assets/:id",
            patch(manual_assets::update_manual_asset).delete(manual_assets::delete_manual_asset),
        )
        .route("/networth/series", get(reports::net_worth))
        .route("/spend/summary", get(reports::spending))
        .route("/sync", post(sync_handlers::sync_now));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    database: Option<Arc<Database>>,
    scheduler: Option<SyncScheduler>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: FinanceConfig) -> Result<Self, AppError> {
        init_metrics();

        let (store, database): (Arc<dyn Store>, Option<Arc<Database>>) = match config.store {
            StoreBackend::Postgres => {
                let db = Database::new(
                    config.database.url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                let db = Arc::new(db);
                let store: Arc<dyn Store> = db.clone();
                (store, Some(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data will not survive a restart");
                let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
                (store, None)
            }
        };

        let plaid = PlaidClient::new(config.aggregator.clone())?;
        if !plaid.is_configured() {
            tracing::warn!("Aggregator credentials not configured - linking and sync will fail");
        }

        let state = AppState::new(config, store, Arc::new(plaid));

        let scheduler = if state.config.sync.scheduler_enabled {
            let mut scheduler = SyncScheduler::new(state.sync.clone(), &state.config.sync);
            scheduler.start();
            Some(scheduler)
        } else {
            tracing::info!("Sync scheduler disabled");
            None
        };

        let addr: SocketAddr = state
            .config
            .common
            .bind_address()
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Finance service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            database,
            scheduler,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` resolves, then stop the scheduler and close the pool.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state.clone());

        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let served = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }
        if let Some(database) = self.database {
            database.close().await;
        }

        served.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
