//! Persistence abstraction shared by the sync core and the HTTP handlers.
//!
//! [`crate::services::Database`] implements it over PostgreSQL and
//! [`crate::services::MemoryStore`] keeps everything in process.

use crate::models::{
    Account, AccountOverview, BalanceSnapshot, DatedAccountBalance, Institution,
    InstitutionStatus, ManualAsset, ManualAssetUpdate, NewAccount, NewInstitution, NewSnapshot,
    NewTransaction, SnapshotWrite, SyncFrequency, Transaction, TransactionSummary,
    TransactionUpdate, User,
};
use crate::services::filter::{TransactionFilter, TransactionPage};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Users

    /// Fails with `Conflict` when the email is taken.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        sync_frequency: SyncFrequency,
    ) -> Result<User, AppError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn list_user_ids_by_frequency(
        &self,
        frequency: SyncFrequency,
    ) -> Result<Vec<Uuid>, AppError>;

    // Institutions

    async fn create_institution(&self, new: NewInstitution) -> Result<Institution, AppError>;

    /// Active institutions in creation order.
    async fn list_active_institutions(&self, user_id: Uuid) -> Result<Vec<Institution>, AppError>;

    async fn set_institution_status(
        &self,
        institution_id: Uuid,
        status: InstitutionStatus,
    ) -> Result<(), AppError>;

    // Accounts

    async fn create_account(&self, new: NewAccount) -> Result<Account, AppError>;

    async fn get_account(&self, user_id: Uuid, account_id: Uuid)
        -> Result<Option<Account>, AppError>;

    async fn list_active_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError>;

    async fn list_active_institution_accounts(
        &self,
        institution_id: Uuid,
    ) -> Result<Vec<Account>, AppError>;

    async fn list_account_overviews(&self, user_id: Uuid)
        -> Result<Vec<AccountOverview>, AppError>;

    async fn set_account_active(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        is_active: bool,
    ) -> Result<Option<Account>, AppError>;

    // Balance snapshots

    async fn get_snapshot(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, AppError>;

    /// Write under the one-per-(user, account, date) rule: an aggregator
    /// snapshot replaces a forward fill, everything else is left alone.
    async fn write_snapshot(&self, snapshot: NewSnapshot) -> Result<SnapshotWrite, AppError>;

    async fn latest_snapshot(&self, account_id: Uuid) -> Result<Option<BalanceSnapshot>, AppError>;

    /// Ascending by date; bounds are inclusive.
    async fn list_snapshots(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>, AppError>;

    /// Snapshots of active accounts in `[from, to]`, ascending by date.
    async fn list_active_balances_between(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DatedAccountBalance>, AppError>;

    // Transactions

    async fn transaction_exists(&self, provider_transaction_id: &str) -> Result<bool, AppError>;

    /// Returns `false` when the provider id is already stored.
    async fn insert_transaction(&self, new: NewTransaction) -> Result<bool, AppError>;

    async fn list_transaction_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionSummary>, AppError>;

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, AppError>;

    /// Settled, non-transfer transactions dated within `[from, to]`.
    async fn list_spending_transactions(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError>;

    async fn update_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>, AppError>;

    // Manual assets

    /// Newest first.
    async fn list_manual_assets(&self, user_id: Uuid) -> Result<Vec<ManualAsset>, AppError>;

    async fn create_manual_asset(
        &self,
        user_id: Uuid,
        name: &str,
        current_value: rust_decimal::Decimal,
    ) -> Result<ManualAsset, AppError>;

    async fn update_manual_asset(
        &self,
        user_id: Uuid,
        asset_id: Uuid,
        update: ManualAssetUpdate,
    ) -> Result<Option<ManualAsset>, AppError>;

    /// Returns `false` when nothing was deleted.
    async fn delete_manual_asset(&self, user_id: Uuid, asset_id: Uuid) -> Result<bool, AppError>;
}
