//! In-process store used for local development and tests.
//!
//! Mirrors the Postgres semantics: unique emails, unique provider
//! transaction ids and one snapshot per (user, account, date).

use crate::models::{
    Account, AccountOverview, BalanceSnapshot, DatedAccountBalance, Institution,
    InstitutionStatus, ManualAsset, ManualAssetUpdate, NewAccount, NewInstitution, NewSnapshot,
    NewTransaction, SnapshotSource, SnapshotWrite, SyncFrequency, Transaction,
    TransactionSummary, TransactionUpdate, TransactionWithAccount, User,
};
use crate::services::filter::{TransactionFilter, TransactionPage};
use crate::services::store::Store;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    institutions: Vec<Institution>,
    accounts: Vec<Account>,
    snapshots: HashMap<(Uuid, Uuid, NaiveDate), BalanceSnapshot>,
    transactions: Vec<Transaction>,
    manual_assets: Vec<ManualAsset>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        sync_frequency: SyncFrequency,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.email == email) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An account with this email already exists"
            )));
        }
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            sync_frequency: sync_frequency.as_str().to_string(),
            created_utc: Utc::now(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_user_ids_by_frequency(
        &self,
        frequency: SyncFrequency,
    ) -> Result<Vec<Uuid>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.sync_frequency == frequency.as_str())
            .map(|u| u.user_id)
            .collect())
    }

    async fn create_institution(&self, new: NewInstitution) -> Result<Institution, AppError> {
        let now = Utc::now();
        let institution = Institution {
            institution_id: Uuid::new_v4(),
            user_id: new.user_id,
            item_id: new.item_id,
            access_token_encrypted: new.access_token_encrypted,
            institution_name: new.institution_name,
            status: InstitutionStatus::Active.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        };
        self.inner
            .write()
            .await
            .institutions
            .push(institution.clone());
        Ok(institution)
    }

    async fn list_active_institutions(&self, user_id: Uuid) -> Result<Vec<Institution>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .institutions
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active())
            .cloned()
            .collect())
    }

    async fn set_institution_status(
        &self,
        institution_id: Uuid,
        status: InstitutionStatus,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(institution) = inner
            .institutions
            .iter_mut()
            .find(|i| i.institution_id == institution_id)
        {
            institution.status = status.as_str().to_string();
            institution.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, AppError> {
        let account = Account {
            account_id: Uuid::new_v4(),
            user_id: new.user_id,
            institution_id: new.institution_id,
            provider_account_id: new.provider_account_id,
            name: new.name,
            official_name: new.official_name,
            mask: new.mask,
            account_type: new.account_type,
            subtype: new.subtype,
            is_active: true,
            created_utc: Utc::now(),
        };
        self.inner.write().await.accounts.push(account.clone());
        Ok(account)
    }

    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .iter()
            .find(|a| a.user_id == user_id && a.account_id == account_id)
            .cloned())
    }

    async fn list_active_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id && a.is_active)
            .cloned()
            .collect())
    }

    async fn list_active_institution_accounts(
        &self,
        institution_id: Uuid,
    ) -> Result<Vec<Account>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .iter()
            .filter(|a| a.institution_id == Some(institution_id) && a.is_active)
            .cloned()
            .collect())
    }

    async fn list_account_overviews(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<AccountOverview>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id && a.is_active)
            .map(|account| {
                let institution = account.institution_id.and_then(|id| {
                    inner.institutions.iter().find(|i| i.institution_id == id)
                });
                let latest = inner
                    .snapshots
                    .values()
                    .filter(|s| s.account_id == account.account_id)
                    .max_by_key(|s| s.date);
                AccountOverview {
                    account: account.clone(),
                    institution_name: institution.map(|i| i.institution_name.clone()),
                    institution_status: institution.map(|i| i.status.clone()),
                    balance: latest.map(|s| s.balance),
                    balance_date: latest.map(|s| s.date),
                }
            })
            .collect())
    }

    async fn set_account_active(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        is_active: bool,
    ) -> Result<Option<Account>, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .accounts
            .iter_mut()
            .find(|a| a.user_id == user_id && a.account_id == account_id)
            .map(|account| {
                account.is_active = is_active;
                account.clone()
            }))
    }

    async fn get_snapshot(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.snapshots.get(&(user_id, account_id, date)).cloned())
    }

    async fn write_snapshot(&self, snapshot: NewSnapshot) -> Result<SnapshotWrite, AppError> {
        let mut inner = self.inner.write().await;
        let key = (snapshot.user_id, snapshot.account_id, snapshot.date);

        if let Some(existing) = inner.snapshots.get_mut(&key) {
            if existing.source() == SnapshotSource::ForwardFill
                && snapshot.source == SnapshotSource::Plaid
            {
                existing.balance = snapshot.balance;
                existing.source = snapshot.source.as_str().to_string();
                existing.is_stale = false;
                return Ok(SnapshotWrite::ReplacedForwardFill);
            }
            return Ok(SnapshotWrite::Unchanged);
        }

        inner.snapshots.insert(
            key,
            BalanceSnapshot {
                snapshot_id: Uuid::new_v4(),
                user_id: snapshot.user_id,
                account_id: snapshot.account_id,
                date: snapshot.date,
                balance: snapshot.balance,
                source: snapshot.source.as_str().to_string(),
                is_stale: snapshot.source.is_stale(),
                created_utc: Utc::now(),
            },
        );
        Ok(SnapshotWrite::Inserted)
    }

    async fn latest_snapshot(
        &self,
        account_id: Uuid,
    ) -> Result<Option<BalanceSnapshot>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .values()
            .filter(|s| s.account_id == account_id)
            .max_by_key(|s| s.date)
            .cloned())
    }

    async fn list_snapshots(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>, AppError> {
        let inner = self.inner.read().await;
        let mut snapshots: Vec<BalanceSnapshot> = inner
            .snapshots
            .values()
            .filter(|s| s.user_id == user_id && s.account_id == account_id)
            .filter(|s| from.map_or(true, |f| s.date >= f))
            .filter(|s| to.map_or(true, |t| s.date <= t))
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.date);
        Ok(snapshots)
    }

    async fn list_active_balances_between(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DatedAccountBalance>, AppError> {
        let inner = self.inner.read().await;
        let mut balances: Vec<DatedAccountBalance> = inner
            .snapshots
            .values()
            .filter(|s| s.user_id == user_id && s.date >= from && s.date <= to)
            .filter_map(|s| {
                inner
                    .accounts
                    .iter()
                    .find(|a| a.account_id == s.account_id && a.is_active)
                    .map(|a| DatedAccountBalance {
                        date: s.date,
                        balance: s.balance,
                        account_id: a.account_id,
                        account_name: a.name.clone(),
                        account_type: a.account_type.clone(),
                    })
            })
            .collect();
        balances.sort_by_key(|b| b.date);
        Ok(balances)
    }

    async fn transaction_exists(&self, provider_transaction_id: &str) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .any(|t| t.provider_transaction_id == provider_transaction_id))
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .transactions
            .iter()
            .any(|t| t.provider_transaction_id == new.provider_transaction_id)
        {
            return Ok(false);
        }
        inner.transactions.push(Transaction {
            transaction_id: Uuid::new_v4(),
            user_id: new.user_id,
            account_id: new.account_id,
            provider_transaction_id: new.provider_transaction_id,
            amount: new.amount,
            date: new.date,
            authorized_date: new.authorized_date,
            name: new.name,
            merchant_name: new.merchant_name,
            original_description: new.original_description,
            raw_category: new.raw_category,
            personal_category: new.personal_category,
            is_transfer: new.is_transfer,
            is_pending: new.is_pending,
            created_utc: Utc::now(),
        });
        Ok(true)
    }

    async fn list_transaction_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionSummary>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| TransactionSummary {
                amount: t.amount,
                date: t.date,
                account_id: t.account_id,
                name: t.name.clone(),
            })
            .collect())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, AppError> {
        let inner = self.inner.read().await;

        let mut rows: Vec<TransactionWithAccount> = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && filter.matches(t))
            .filter_map(|t| {
                inner
                    .accounts
                    .iter()
                    .find(|a| a.account_id == t.account_id)
                    .map(|a| TransactionWithAccount {
                        transaction: t.clone(),
                        account_name: a.name.clone(),
                        account_type: a.account_type.clone(),
                    })
            })
            .collect();
        rows.sort_by(|a, b| {
            (b.transaction.date, b.transaction.transaction_id)
                .cmp(&(a.transaction.date, a.transaction.transaction_id))
        });

        if let Some(cursor) = filter.cursor {
            let Some(anchor) = inner
                .transactions
                .iter()
                .find(|t| t.transaction_id == cursor && t.user_id == user_id)
                .map(|t| (t.date, t.transaction_id))
            else {
                return Ok(TransactionPage::from_rows(Vec::new(), filter.limit));
            };
            rows.retain(|r| (r.transaction.date, r.transaction.transaction_id) < anchor);
        }

        rows.truncate(filter.limit as usize + 1);
        Ok(TransactionPage::from_rows(rows, filter.limit))
    }

    async fn list_spending_transactions(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let inner = self.inner.read().await;
        let mut transactions: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.date >= from && t.date <= to)
            .filter(|t| !t.is_pending && !t.is_transfer)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.date);
        Ok(transactions)
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .transactions
            .iter_mut()
            .find(|t| t.user_id == user_id && t.transaction_id == transaction_id)
            .map(|txn| {
                if let Some(category) = update.personal_category {
                    txn.personal_category = Some(category);
                }
                if let Some(merchant) = update.merchant_name {
                    txn.merchant_name = Some(merchant);
                }
                txn.clone()
            }))
    }

    async fn list_manual_assets(&self, user_id: Uuid) -> Result<Vec<ManualAsset>, AppError> {
        let inner = self.inner.read().await;
        // Insertion order is creation order.
        Ok(inner
            .manual_assets
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_manual_asset(
        &self,
        user_id: Uuid,
        name: &str,
        current_value: Decimal,
    ) -> Result<ManualAsset, AppError> {
        let now = Utc::now();
        let asset = ManualAsset {
            asset_id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            current_value,
            created_utc: now,
            updated_utc: now,
        };
        self.inner.write().await.manual_assets.push(asset.clone());
        Ok(asset)
    }

    async fn update_manual_asset(
        &self,
        user_id: Uuid,
        asset_id: Uuid,
        update: ManualAssetUpdate,
    ) -> Result<Option<ManualAsset>, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .manual_assets
            .iter_mut()
            .find(|a| a.user_id == user_id && a.asset_id == asset_id)
            .map(|asset| {
                if let Some(name) = update.name {
                    asset.name = name;
                }
                if let Some(value) = update.current_value {
                    asset.current_value = value;
                }
                asset.updated_utc = Utc::now();
                asset.clone()
            }))
    }

    async fn delete_manual_asset(&self, user_id: Uuid, asset_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.manual_assets.len();
        inner
            .manual_assets
            .retain(|a| !(a.user_id == user_id && a.asset_id == asset_id));
        Ok(inner.manual_assets.len() < before)
    }
}
