//! Dashboard aggregates: net-worth series and monthly spending summary.
//!
//! Both are pure functions over rows already loaded from the store.

use crate::models::{is_liability_type, DatedAccountBalance, ManualAsset, Transaction};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};

/// Account type reported for manual assets in the series breakdown.
pub const MANUAL_ACCOUNT_TYPE: &str = "manual";

/// Days looked back when computing the net-worth change.
pub const CHANGE_WINDOW_DAYS: i64 = 30;

const TOP_MERCHANTS: usize = 10;

// ============================================================================
// Net worth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalance {
    pub account_type: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetWorthPoint {
    pub date: NaiveDate,
    pub assets: Decimal,
    /// Absolute amount owed on credit accounts.
    pub liabilities: Decimal,
    pub net_worth: Decimal,
    /// Keyed by account or asset name.
    pub accounts: BTreeMap<String, AccountBalance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetWorthSeries {
    pub series: Vec<NetWorthPoint>,
    pub current_net_worth: Decimal,
    pub net_worth_change: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
}

/// Fold snapshots into one point per day with data.
///
/// Manual assets hold their current value on every day. The change is the
/// latest net worth minus the first point dated within the last
/// [`CHANGE_WINDOW_DAYS`] of `today`.
pub fn net_worth_series(
    balances: &[DatedAccountBalance],
    manual_assets: &[ManualAsset],
    today: NaiveDate,
) -> NetWorthSeries {
    let mut by_date: BTreeMap<NaiveDate, NetWorthPoint> = BTreeMap::new();

    for row in balances {
        let point = by_date.entry(row.date).or_insert_with(|| NetWorthPoint {
            date: row.date,
            assets: Decimal::ZERO,
            liabilities: Decimal::ZERO,
            net_worth: Decimal::ZERO,
            accounts: BTreeMap::new(),
        });
        if is_liability_type(&row.account_type) {
            point.liabilities += row.balance.abs();
        } else {
            point.assets += row.balance;
        }
        point.accounts.insert(
            row.account_name.clone(),
            AccountBalance {
                account_type: row.account_type.clone(),
                balance: row.balance,
            },
        );
    }

    let manual_total: Decimal = manual_assets.iter().map(|a| a.current_value).sum();
    let series: Vec<NetWorthPoint> = by_date
        .into_values()
        .map(|mut point| {
            point.assets += manual_total;
            point.net_worth = point.assets - point.liabilities;
            for asset in manual_assets {
                point.accounts.insert(
                    asset.name.clone(),
                    AccountBalance {
                        account_type: MANUAL_ACCOUNT_TYPE.to_string(),
                        balance: asset.current_value,
                    },
                );
            }
            point
        })
        .collect();

    let Some(latest) = series.last() else {
        return NetWorthSeries {
            series,
            current_net_worth: Decimal::ZERO,
            net_worth_change: Decimal::ZERO,
            total_assets: Decimal::ZERO,
            total_liabilities: Decimal::ZERO,
        };
    };

    let window_start = today - Duration::days(CHANGE_WINDOW_DAYS);
    let reference = series
        .iter()
        .find(|p| p.date >= window_start)
        .map(|p| p.net_worth)
        .unwrap_or(Decimal::ZERO);

    NetWorthSeries {
        current_net_worth: latest.net_worth,
        net_worth_change: latest.net_worth - reference,
        total_assets: latest.assets,
        total_liabilities: latest.liabilities,
        series,
    }
}

// ============================================================================
// Spending
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantTotal {
    pub merchant: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendSummary {
    /// `YYYY-MM`
    pub month: String,
    pub total_income: Decimal,
    pub total_spending: Decimal,
    pub net_cash_flow: Decimal,
    /// Largest first.
    pub by_category: Vec<CategoryTotal>,
    /// Largest first, at most ten.
    pub top_merchants: Vec<MerchantTotal>,
}

/// First and last day of the month named by `YYYY-MM`.
pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate), AppError> {
    let invalid = || AppError::BadRequest(anyhow::anyhow!("Invalid month: expected YYYY-MM"));
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(invalid)?;
    Ok((first, next - Duration::days(1)))
}

fn ranked<T>(totals: HashMap<String, Decimal>, make: impl Fn(String, Decimal) -> T) -> Vec<T> {
    let mut entries: Vec<(String, Decimal)> = totals.into_iter().collect();
    entries.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));
    entries.into_iter().map(|(k, v)| make(k, v)).collect()
}

/// Summarise settled, non-transfer transactions for one month.
pub fn spend_summary(month_start: NaiveDate, transactions: &[Transaction]) -> SpendSummary {
    let mut total_income = Decimal::ZERO;
    let mut total_spending = Decimal::ZERO;
    let mut by_category: HashMap<String, Decimal> = HashMap::new();
    let mut by_merchant: HashMap<String, Decimal> = HashMap::new();

    for txn in transactions.iter().filter(|t| !t.is_pending && !t.is_transfer) {
        if txn.amount > Decimal::ZERO {
            total_income += txn.amount;
        } else {
            let spent = txn.amount.abs();
            total_spending += spent;
            *by_category
                .entry(txn.display_category().to_string())
                .or_default() += spent;
            *by_merchant
                .entry(txn.merchant_or_name().to_string())
                .or_default() += spent;
        }
    }

    let mut top_merchants = ranked(by_merchant, |merchant, amount| MerchantTotal {
        merchant,
        amount,
    });
    top_merchants.truncate(TOP_MERCHANTS);

    SpendSummary {
        month: month_start.format("%Y-%m").to_string(),
        total_income,
        total_spending,
        net_cash_flow: total_income - total_spending,
        by_category: ranked(by_category, |category, amount| CategoryTotal { category, amount }),
        top_merchants,
    }
}
