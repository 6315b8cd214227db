use crate::models::{Institution, NewTransaction};
use crate::services::aggregator::with_timeout;
use crate::services::metrics::{record_institution_failure, record_transaction_import};
use crate::sync::categories::normalize_category;
use crate::sync::orchestrator::SyncEngine;
use crate::sync::transfer::TransferCandidate;
use crate::sync::SyncError;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Convert an aggregator amount (spending positive) to the ledger
/// convention (inflow positive).
pub fn to_ledger_amount(aggregator_amount: Decimal) -> Decimal {
    -aggregator_amount
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionSyncReport {
    pub imported: u32,
    /// Already stored under the same provider id.
    pub duplicates: u32,
    /// Belonged to an account that is unknown or inactive.
    pub unmatched: u32,
    /// Imported ones flagged as transfers.
    pub transfers: u32,
    pub institutions_failed: u32,
    pub aborted: bool,
}

impl SyncEngine {
    /// Import the trailing window of transactions for every active
    /// institution of the user. Stored transactions are never rewritten.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_transactions(&self, user_id: Uuid, today: NaiveDate) -> TransactionSyncReport {
        let mut report = TransactionSyncReport::default();

        let institutions = match self.store.list_active_institutions(user_id).await {
            Ok(institutions) => institutions,
            Err(e) => {
                error!(error = %e, "Failed to list institutions for transaction sync");
                report.aborted = true;
                return report;
            }
        };

        let start = today - Duration::days(self.transaction_window_days);

        for institution in &institutions {
            if let Err(e) = self
                .import_institution(user_id, institution, start, today, &mut report)
                .await
            {
                report.institutions_failed += 1;
                record_institution_failure("transactions");
                warn!(
                    institution_id = %institution.institution_id,
                    error = %e,
                    "Transaction sync failed for institution"
                );
            }
        }

        report
    }

    async fn import_institution(
        &self,
        user_id: Uuid,
        institution: &Institution,
        start: NaiveDate,
        end: NaiveDate,
        report: &mut TransactionSyncReport,
    ) -> Result<(), SyncError> {
        let access_token = self.cipher.decrypt(&institution.access_token_encrypted)?;
        let fetched = with_timeout(
            "get_transactions",
            self.call_timeout,
            self.aggregator.get_transactions(&access_token, start, end),
        )
        .await?;

        let accounts = self
            .store
            .list_active_institution_accounts(institution.institution_id)
            .await?;
        // Loaded once; transactions imported below are not compared against each other.
        let existing = self.store.list_transaction_summaries(user_id).await?;

        let mut imported = 0;
        for txn in fetched {
            let Some(account) = accounts
                .iter()
                .find(|a| a.provider_account_id.as_deref() == Some(txn.account_id.as_str()))
            else {
                report.unmatched += 1;
                continue;
            };

            if self.store.transaction_exists(&txn.transaction_id).await? {
                report.duplicates += 1;
                continue;
            }

            let amount = to_ledger_amount(txn.amount);
            let raw_category = txn.category.unwrap_or_default();
            let is_transfer = self.transfer_rules.is_transfer(
                &TransferCandidate {
                    amount,
                    date: txn.date,
                    account_id: account.account_id,
                    name: &txn.name,
                },
                &existing,
            );

            let inserted = self
                .store
                .insert_transaction(NewTransaction {
                    user_id,
                    account_id: account.account_id,
                    provider_transaction_id: txn.transaction_id,
                    amount,
                    date: txn.date,
                    authorized_date: txn.authorized_date,
                    name: txn.name,
                    merchant_name: txn.merchant_name,
                    original_description: txn.original_description,
                    personal_category: Some(normalize_category(&raw_category)),
                    raw_category,
                    is_transfer,
                    is_pending: false,
                })
                .await?;

            if !inserted {
                report.duplicates += 1;
                continue;
            }
            imported += 1;
            report.imported += 1;
            if is_transfer {
                report.transfers += 1;
                record_transaction_import("transfer");
            } else {
                record_transaction_import("regular");
            }
        }

        info!(
            institution_id = %institution.institution_id,
            imported = imported,
            "Institution transactions imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_amount_flips_sign() {
        assert_eq!(to_ledger_amount(Decimal::new(4250, 2)), Decimal::new(-4250, 2));
        assert_eq!(to_ledger_amount(Decimal::new(-120000, 2)), Decimal::new(120000, 2));
    }
}
