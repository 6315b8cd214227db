//! Domain models for finance-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Fallback shown when a transaction carries no category at all.
pub const FALLBACK_CATEGORY: &str = "Other";

// ============================================================================
// User Models
// ============================================================================

/// How often the scheduler syncs a user's linked institutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncFrequency {
    Daily,
    Weekly,
    /// Never picked up by the scheduler.
    Manual,
}

impl SyncFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub sync_frequency: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Institution Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstitutionStatus {
    Active,
    /// A fetch failed; stays here until the user re-links.
    Error,
}

impl InstitutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Institution {
    pub institution_id: Uuid,
    pub user_id: Uuid,
    pub item_id: String,
    #[serde(skip_serializing)]
    pub access_token_encrypted: String,
    pub institution_name: String,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Institution {
    pub fn is_active(&self) -> bool {
        InstitutionStatus::from_str(&self.status) == InstitutionStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewInstitution {
    pub user_id: Uuid,
    pub item_id: String,
    pub access_token_encrypted: String,
    pub institution_name: String,
}

// ============================================================================
// Account Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub institution_id: Option<Uuid>,
    pub provider_account_id: Option<String>,
    pub name: String,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    pub account_type: String,
    pub subtype: Option<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    /// Credit balances count against net worth.
    pub fn is_liability(&self) -> bool {
        is_liability_type(&self.account_type)
    }
}

pub fn is_liability_type(account_type: &str) -> bool {
    account_type == "credit"
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub institution_id: Option<Uuid>,
    pub provider_account_id: Option<String>,
    pub name: String,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    pub account_type: String,
    pub subtype: Option<String>,
}

/// Active account with its institution and most recent balance.
#[derive(Debug, Clone, FromRow)]
pub struct AccountOverview {
    #[sqlx(flatten)]
    pub account: Account,
    pub institution_name: Option<String>,
    pub institution_status: Option<String>,
    pub balance: Option<Decimal>,
    pub balance_date: Option<NaiveDate>,
}

// ============================================================================
// Balance Snapshot Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Fetched from the aggregator.
    Plaid,
    /// Carried forward from the previous known balance.
    ForwardFill,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaid => "plaid",
            Self::ForwardFill => "forward_fill",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "forward_fill" => Self::ForwardFill,
            _ => Self::Plaid,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::ForwardFill)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BalanceSnapshot {
    pub snapshot_id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub balance: Decimal,
    pub source: String,
    pub is_stale: bool,
    pub created_utc: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn source(&self) -> SnapshotSource {
        SnapshotSource::from_str(&self.source)
    }
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub balance: Decimal,
    pub source: SnapshotSource,
}

/// Outcome of writing a snapshot under the one-per-day constraint.
///
/// An aggregator snapshot replaces a forward-filled one for the same day;
/// nothing else is ever overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    Inserted,
    ReplacedForwardFill,
    Unchanged,
}

/// One snapshot joined with the account fields the net-worth series needs.
#[derive(Debug, Clone, FromRow)]
pub struct DatedAccountBalance {
    pub date: NaiveDate,
    pub balance: Decimal,
    pub account_id: Uuid,
    pub account_name: String,
    pub account_type: String,
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub provider_transaction_id: String,
    /// Positive is money in.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub name: String,
    pub merchant_name: Option<String>,
    pub original_description: Option<String>,
    pub raw_category: Vec<String>,
    pub personal_category: Option<String>,
    pub is_transfer: bool,
    pub is_pending: bool,
    pub created_utc: DateTime<Utc>,
}

impl Transaction {
    pub fn display_category(&self) -> &str {
        self.personal_category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| {
                self.raw_category
                    .first()
                    .map(String::as_str)
                    .filter(|c| !c.trim().is_empty())
            })
            .unwrap_or(FALLBACK_CATEGORY)
    }

    /// Merchant name when known, otherwise the raw name.
    pub fn merchant_or_name(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub provider_transaction_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub name: String,
    pub merchant_name: Option<String>,
    pub original_description: Option<String>,
    pub raw_category: Vec<String>,
    pub personal_category: Option<String>,
    pub is_transfer: bool,
    pub is_pending: bool,
}

/// The projection transfer detection compares against.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionSummary {
    pub amount: Decimal,
    pub date: NaiveDate,
    pub account_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionWithAccount {
    #[sqlx(flatten)]
    pub transaction: Transaction,
    pub account_name: String,
    pub account_type: String,
}

/// User edits; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub personal_category: Option<String>,
    pub merchant_name: Option<String>,
}

// ============================================================================
// Manual Asset Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ManualAsset {
    pub asset_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub current_value: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ManualAssetUpdate {
    pub name: Option<String>,
    pub current_value: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(personal: Option<&str>, raw: &[&str]) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider_transaction_id: "txn".to_string(),
            amount: Decimal::new(-1250, 2),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            authorized_date: None,
            name: "COFFEE".to_string(),
            merchant_name: None,
            original_description: None,
            raw_category: raw.iter().map(|s| s.to_string()).collect(),
            personal_category: personal.map(str::to_string),
            is_transfer: false,
            is_pending: false,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn display_category_prefers_personal_then_raw() {
        assert_eq!(txn(Some("Coffee"), &["Food and Drink"]).display_category(), "Coffee");
        assert_eq!(txn(None, &["Food and Drink", "Cafe"]).display_category(), "Food and Drink");
        assert_eq!(txn(None, &[]).display_category(), FALLBACK_CATEGORY);
    }

    #[test]
    fn blank_categories_display_as_fallback() {
        assert_eq!(txn(Some(""), &[""]).display_category(), FALLBACK_CATEGORY);
        assert_eq!(txn(Some("  "), &["Travel"]).display_category(), "Travel");
    }

    #[test]
    fn merchant_falls_back_to_name() {
        let mut t = txn(None, &[]);
        assert_eq!(t.merchant_or_name(), "COFFEE");
        t.merchant_name = Some("Blue Bottle".to_string());
        assert_eq!(t.merchant_or_name(), "Blue Bottle");
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(SyncFrequency::from_str("weekly"), Some(SyncFrequency::Weekly));
        assert_eq!(SyncFrequency::from_str("hourly"), None);
        assert_eq!(InstitutionStatus::from_str("active"), InstitutionStatus::Active);
        assert!(SnapshotSource::ForwardFill.is_stale());
        assert!(!SnapshotSource::Plaid.is_stale());
    }
}
