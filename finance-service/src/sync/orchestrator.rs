use crate::config::SyncConfig;
use crate::models::SyncFrequency;
use crate::services::metrics::record_sync_run;
use crate::services::{Aggregator, CredentialCipher, Store};
use crate::sync::balances::BalanceSyncReport;
use crate::sync::importer::TransactionSyncReport;
use crate::sync::transfer::TransferRules;
use chrono::NaiveDate;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Everything a sync needs, cheap to clone into per-user tasks.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) aggregator: Arc<dyn Aggregator>,
    pub(crate) cipher: CredentialCipher,
    pub(crate) call_timeout: Duration,
    pub(crate) transaction_window_days: i64,
    pub(crate) transfer_rules: TransferRules,
    /// Held for the whole of a scheduled batch or a manual user sync.
    run_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserSyncReport {
    pub balances: BalanceSyncReport,
    pub transactions: TransactionSyncReport,
}

impl UserSyncReport {
    /// The user's sync could not even list its institutions.
    pub fn aborted(&self) -> bool {
        self.balances.aborted || self.transactions.aborted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunReport {
    pub frequency: String,
    /// Users picked up by the run, failed ones included.
    pub users_processed: u32,
    pub users_failed: u32,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        aggregator: Arc<dyn Aggregator>,
        cipher: CredentialCipher,
        call_timeout: Duration,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            cipher,
            call_timeout,
            transaction_window_days: sync.transaction_window_days,
            transfer_rules: TransferRules::from(sync),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Wait for any other run to finish, then hold the lock until the guard drops.
    pub async fn lock_runs(&self) -> MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }

    /// [`Self::sync_user`] serialised with the scheduled batches.
    pub async fn sync_user_exclusive(&self, user_id: Uuid, today: NaiveDate) -> UserSyncReport {
        let _guard = self.lock_runs().await;
        self.sync_user(user_id, today).await
    }

    /// Reconcile balances, then import transactions, for one user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_user(&self, user_id: Uuid, today: NaiveDate) -> UserSyncReport {
        let balances = self.sync_balances(user_id, today).await;
        let transactions = self.sync_transactions(user_id, today).await;
        info!(
            snapshots_created = balances.snapshots_created,
            snapshots_filled = balances.snapshots_filled,
            transactions_imported = transactions.imported,
            institutions_failed = balances.institutions_failed,
            "User sync completed"
        );
        UserSyncReport {
            balances,
            transactions,
        }
    }

    /// Sync every user on the given cadence, one after another.
    ///
    /// Each user runs in its own task so a panic is contained to that user.
    /// Only a failure to list the users fails the run.
    #[instrument(skip(self), fields(frequency = %frequency))]
    pub async fn run_for_frequency(
        &self,
        frequency: SyncFrequency,
        today: NaiveDate,
    ) -> Result<SyncRunReport, AppError> {
        let user_ids = match self.store.list_user_ids_by_frequency(frequency).await {
            Ok(ids) => ids,
            Err(e) => {
                record_sync_run(frequency.as_str(), "failure");
                error!(error = %e, "Failed to list users for sync run");
                return Err(e);
            }
        };

        info!(users = user_ids.len(), "Sync run started");

        let mut report = SyncRunReport {
            frequency: frequency.to_string(),
            users_processed: 0,
            users_failed: 0,
        };

        for user_id in user_ids {
            let engine = self.clone();
            let handle = tokio::spawn(async move { engine.sync_user(user_id, today).await });

            report.users_processed += 1;
            match handle.await {
                Ok(user_report) if user_report.aborted() => {
                    report.users_failed += 1;
                    error!(user_id = %user_id, "User sync aborted");
                }
                Ok(_) => {}
                Err(e) => {
                    report.users_failed += 1;
                    error!(user_id = %user_id, error = %e, "User sync task failed");
                }
            }
        }

        record_sync_run(frequency.as_str(), "success");
        info!(
            users_processed = report.users_processed,
            users_failed = report.users_failed,
            "Sync run finished"
        );
        Ok(report)
    }
}
