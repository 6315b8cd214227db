//! Typed transaction listing filter.
//!
//! Query-string parameters are parsed once into [`TransactionFilter`]; the
//! Postgres store turns it into SQL in `push_transaction_filter` and the
//! in-memory store evaluates [`TransactionFilter::matches`].

use crate::models::{Transaction, TransactionWithAccount};
use chrono::NaiveDate;
use serde::Deserialize;
use service_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Raw query parameters as they arrive on `GET /api/transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub account_id: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    /// Matches the personal category or any raw label exactly.
    pub category: Option<String>,
    /// Case-insensitive substring of the name or merchant name.
    pub search: Option<String>,
    pub include_pending: bool,
    pub limit: i64,
    /// Id of the last transaction on the previous page.
    pub cursor: Option<Uuid>,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            account_id: None,
            category: None,
            search: None,
            include_pending: false,
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    // Accept full timestamps too; only the day matters.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {}: expected YYYY-MM-DD", field)))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::from_str(raw).map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {}", field)))
}

impl TryFrom<TransactionQuery> for TransactionFilter {
    type Error = AppError;

    fn try_from(query: TransactionQuery) -> Result<Self, Self::Error> {
        let from = non_empty(query.from)
            .map(|raw| parse_date("from", &raw))
            .transpose()?;
        let to = non_empty(query.to)
            .map(|raw| parse_date("to", &raw))
            .transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "'from' must not be after 'to'"
                )));
            }
        }

        Ok(Self {
            from,
            to,
            account_id: non_empty(query.account_id)
                .map(|raw| parse_uuid("account_id", &raw))
                .transpose()?,
            category: non_empty(query.category),
            search: non_empty(query.search),
            include_pending: false,
            limit: query
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            cursor: non_empty(query.cursor)
                .map(|raw| parse_uuid("cursor", &raw))
                .transpose()?,
        })
    }
}

impl TransactionFilter {
    /// Everything except the cursor, which depends on listing order.
    pub fn matches(&self, txn: &Transaction) -> bool {
        if !self.include_pending && txn.is_pending {
            return false;
        }
        if self.from.is_some_and(|from| txn.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| txn.date > to) {
            return false;
        }
        if self.account_id.is_some_and(|id| txn.account_id != id) {
            return false;
        }
        if let Some(category) = &self.category {
            let personal = txn.personal_category.as_deref() == Some(category.as_str());
            if !personal && !txn.raw_category.iter().any(|c| c == category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_name = txn.name.to_lowercase().contains(&needle);
            let in_merchant = txn
                .merchant_name
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(&needle));
            if !in_name && !in_merchant {
                return false;
            }
        }
        true
    }
}

/// One page of a transaction listing.
#[derive(Debug, Clone)]
pub struct TransactionPage {
    pub items: Vec<TransactionWithAccount>,
    pub next_cursor: Option<Uuid>,
}

impl TransactionPage {
    /// Build a page from up to `limit + 1` rows already in listing order.
    pub fn from_rows(mut rows: Vec<TransactionWithAccount>, limit: i64) -> Self {
        let has_more = rows.len() > limit as usize;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(|r| r.transaction.transaction_id)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn txn(name: &str, merchant: Option<&str>, date: &str) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider_transaction_id: Uuid::new_v4().to_string(),
            amount: Decimal::new(-500, 2),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            authorized_date: None,
            name: name.to_string(),
            merchant_name: merchant.map(str::to_string),
            original_description: None,
            raw_category: vec!["Food and Drink".to_string(), "Restaurants".to_string()],
            personal_category: Some("Food & Dining".to_string()),
            is_transfer: false,
            is_pending: false,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn query_parses_and_clamps() {
        let filter = TransactionFilter::try_from(TransactionQuery {
            from: Some("2024-01-01".into()),
            to: Some("2024-01-31T23:59:59Z".into()),
            limit: Some(10_000),
            search: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(filter.to, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.search, None);
    }

    #[test]
    fn query_rejects_bad_values() {
        let bad_date = TransactionQuery {
            from: Some("01/02/2024".into()),
            ..Default::default()
        };
        assert!(TransactionFilter::try_from(bad_date).is_err());

        let inverted = TransactionQuery {
            from: Some("2024-02-01".into()),
            to: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert!(TransactionFilter::try_from(inverted).is_err());

        let bad_cursor = TransactionQuery {
            cursor: Some("nope".into()),
            ..Default::default()
        };
        assert!(TransactionFilter::try_from(bad_cursor).is_err());
    }

    #[test]
    fn category_and_search_combine() {
        let t = txn("SQ *CAFE LUNA", Some("Cafe Luna"), "2024-01-10");
        let filter = TransactionFilter {
            category: Some("Restaurants".into()),
            search: Some("luna".into()),
            ..Default::default()
        };
        assert!(filter.matches(&t));

        let wrong_category = TransactionFilter {
            category: Some("Travel".into()),
            search: Some("luna".into()),
            ..Default::default()
        };
        assert!(!wrong_category.matches(&t));
    }

    #[test]
    fn date_bounds_are_inclusive_and_pending_hidden() {
        let mut t = txn("RENT", None, "2024-01-31");
        let filter = TransactionFilter {
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        };
        assert!(filter.matches(&t));
        t.is_pending = true;
        assert!(!filter.matches(&t));
    }
}
