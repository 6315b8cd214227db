use crate::models::{Institution, InstitutionStatus, NewSnapshot, SnapshotSource, SnapshotWrite};
use crate::services::aggregator::with_timeout;
use crate::services::metrics::{record_institution_failure, record_snapshot};
use crate::sync::gap_fill::forward_fill;
use crate::sync::orchestrator::SyncEngine;
use crate::sync::SyncError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BalanceSyncReport {
    pub institutions_synced: u32,
    pub institutions_failed: u32,
    /// Snapshots written for today, including ones replacing a forward fill.
    pub snapshots_created: u32,
    pub snapshots_filled: u32,
    pub aborted: bool,
}

impl SyncEngine {
    /// Record today's balance for every active account of the user's active
    /// institutions, then forward-fill gaps.
    ///
    /// Never fails: a failing institution is marked `error` and skipped.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_balances(&self, user_id: Uuid, today: NaiveDate) -> BalanceSyncReport {
        let mut report = BalanceSyncReport::default();

        let institutions = match self.store.list_active_institutions(user_id).await {
            Ok(institutions) => institutions,
            Err(e) => {
                error!(error = %e, "Failed to list institutions for balance sync");
                report.aborted = true;
                return report;
            }
        };

        for institution in &institutions {
            match self.reconcile_institution(user_id, institution, today).await {
                Ok(created) => {
                    report.institutions_synced += 1;
                    report.snapshots_created += created;
                }
                Err(e) => {
                    report.institutions_failed += 1;
                    record_institution_failure("balances");
                    warn!(
                        institution_id = %institution.institution_id,
                        error = %e,
                        "Balance sync failed for institution"
                    );
                    if e.is_fetch_failure() {
                        self.mark_institution_failed(institution).await;
                    }
                }
            }
        }

        match forward_fill(self.store.as_ref(), user_id, today).await {
            Ok(filled) => report.snapshots_filled = filled,
            Err(e) => error!(error = %e, "Gap fill failed"),
        }

        report
    }

    async fn reconcile_institution(
        &self,
        user_id: Uuid,
        institution: &Institution,
        today: NaiveDate,
    ) -> Result<u32, SyncError> {
        let access_token = self.cipher.decrypt(&institution.access_token_encrypted)?;
        let balances = with_timeout(
            "get_current_balances",
            self.call_timeout,
            self.aggregator.get_current_balances(&access_token),
        )
        .await?;

        let accounts = self
            .store
            .list_active_institution_accounts(institution.institution_id)
            .await?;

        let mut created = 0;
        for balance in balances {
            let Some(account) = accounts
                .iter()
                .find(|a| a.provider_account_id.as_deref() == Some(balance.account_id.as_str()))
            else {
                continue;
            };

            let written = self
                .store
                .write_snapshot(NewSnapshot {
                    user_id,
                    account_id: account.account_id,
                    date: today,
                    balance: balance.current.unwrap_or(Decimal::ZERO),
                    source: SnapshotSource::Plaid,
                })
                .await?;
            if written != SnapshotWrite::Unchanged {
                created += 1;
                record_snapshot(SnapshotSource::Plaid.as_str());
            }
        }

        info!(
            institution_id = %institution.institution_id,
            snapshots_created = created,
            "Institution balances reconciled"
        );
        Ok(created)
    }

    async fn mark_institution_failed(&self, institution: &Institution) {
        if let Err(e) = self
            .store
            .set_institution_status(institution.institution_id, InstitutionStatus::Error)
            .await
        {
            error!(
                institution_id = %institution.institution_id,
                error = %e,
                "Failed to mark institution as errored"
            );
        }
    }
}
