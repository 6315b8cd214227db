//! Heuristic detection of transfers between a user's own accounts.

use crate::config::SyncConfig;
use crate::models::TransactionSummary;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Thresholds for [`TransferRules::is_transfer`].
#[derive(Debug, Clone)]
pub struct TransferRules {
    /// Maximum relative difference of absolute amounts, e.g. `0.03`.
    pub amount_tolerance: Decimal,
    pub max_day_gap: i64,
    /// Lowercase substrings that mark a name as a transfer.
    pub keywords: Vec<String>,
}

impl Default for TransferRules {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for TransferRules {
    fn from(config: &SyncConfig) -> Self {
        Self {
            amount_tolerance: config.transfer_amount_tolerance,
            max_day_gap: config.transfer_max_day_gap,
            keywords: config
                .transfer_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }
}

/// A transaction about to be imported, in ledger sign convention.
#[derive(Debug, Clone)]
pub struct TransferCandidate<'a> {
    pub amount: Decimal,
    pub date: NaiveDate,
    pub account_id: Uuid,
    pub name: &'a str,
}

impl TransferRules {
    pub fn is_transfer(&self, candidate: &TransferCandidate<'_>, existing: &[TransactionSummary]) -> bool {
        self.matches_counterpart(candidate, existing) || self.matches_keyword(candidate.name)
    }

    fn matches_keyword(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }

    fn matches_counterpart(&self, candidate: &TransferCandidate<'_>, existing: &[TransactionSummary]) -> bool {
        let amount = candidate.amount.abs();
        // Relative difference is undefined for zero.
        if amount.is_zero() {
            return false;
        }
        existing.iter().any(|other| {
            if other.account_id == candidate.account_id {
                return false;
            }
            let relative = (amount - other.amount.abs()).abs() / amount;
            let day_gap = (candidate.date - other.date).num_days().abs();
            relative <= self.amount_tolerance && day_gap <= self.max_day_gap
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn summary(amount: &str, date: NaiveDate, account_id: Uuid) -> TransactionSummary {
        TransactionSummary {
            amount: amount.parse().unwrap(),
            date,
            account_id,
            name: "ONLINE XFER".to_string(),
        }
    }

    fn candidate<'a>(amount: &str, date: NaiveDate, account_id: Uuid, name: &'a str) -> TransferCandidate<'a> {
        TransferCandidate {
            amount: amount.parse().unwrap(),
            date,
            account_id,
            name,
        }
    }

    #[test]
    fn near_amount_same_day_other_account_is_transfer() {
        let rules = TransferRules::default();
        let existing = vec![summary("101.50", day(10), Uuid::new_v4())];
        assert!(rules.is_transfer(&candidate("-100.00", day(10), Uuid::new_v4(), "ACH DEBIT"), &existing));
    }

    #[test]
    fn three_days_apart_is_not_transfer() {
        let rules = TransferRules::default();
        let existing = vec![summary("101.50", day(7), Uuid::new_v4())];
        assert!(!rules.is_transfer(&candidate("-100.00", day(10), Uuid::new_v4(), "ACH DEBIT"), &existing));
    }

    #[test]
    fn same_account_never_counts() {
        let rules = TransferRules::default();
        let account = Uuid::new_v4();
        let existing = vec![summary("100.00", day(10), account)];
        assert!(!rules.is_transfer(&candidate("-100.00", day(10), account, "ACH DEBIT"), &existing));
    }

    #[test]
    fn amount_outside_tolerance_is_not_transfer() {
        let rules = TransferRules::default();
        let existing = vec![summary("104.00", day(10), Uuid::new_v4())];
        assert!(!rules.is_transfer(&candidate("-100.00", day(10), Uuid::new_v4(), "ACH DEBIT"), &existing));
    }

    #[test]
    fn keyword_always_matches() {
        let rules = TransferRules::default();
        assert!(rules.is_transfer(&candidate("-42.00", day(1), Uuid::new_v4(), "Payment to Visa"), &[]));
        assert!(rules.is_transfer(&candidate("10.00", day(1), Uuid::new_v4(), "Online TRANSFER from SAV"), &[]));
    }

    #[test]
    fn zero_amount_matches_only_by_keyword() {
        let rules = TransferRules::default();
        let existing = vec![summary("0.00", day(1), Uuid::new_v4())];
        assert!(!rules.is_transfer(&candidate("0.00", day(1), Uuid::new_v4(), "ADJUSTMENT"), &existing));
        assert!(rules.is_transfer(&candidate("0.00", day(1), Uuid::new_v4(), "transfer"), &existing));
    }
}
