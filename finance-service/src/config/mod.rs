//! Configuration module for finance-service.

use chrono::Weekday;
use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FinanceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub aggregator: AggregatorConfig,
    pub credentials: CredentialConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

/// Which persistence backend the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; data is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret: Secret<String>,
    pub client_name: String,
    /// Upper bound on any single aggregator call.
    pub timeout: Duration,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub encryption_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
    pub token_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub scheduler_enabled: bool,
    pub run_hour: u32,
    pub run_minute: u32,
    pub weekly_day: Weekday,
    pub transaction_window_days: i64,
    pub transfer_amount_tolerance: Decimal,
    pub transfer_max_day_gap: i64,
    pub transfer_keywords: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scheduler_enabled: true,
            run_hour: 2,
            run_minute: 0,
            weekly_day: Weekday::Sun,
            transaction_window_days: 30,
            transfer_amount_tolerance: Decimal::new(3, 2),
            transfer_max_day_gap: 1,
            transfer_keywords: vec!["transfer".to_string(), "payment".to_string()],
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// A day count from the environment, rejected when unparseable or outside `range`.
fn days_in_range(key: &str, default: i64, range: RangeInclusive<i64>) -> Result<i64, AppError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if range.contains(&days) => Ok(days),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "Invalid {} '{}': expected {}..={} days",
            key,
            raw,
            range.start(),
            range.end()
        ))),
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("{} is required", key)))
}

impl FinanceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORE_BACKEND '{}'",
                    other
                )))
            }
        };

        let database_url = match store {
            StoreBackend::Postgres => required("DATABASE_URL")?,
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let defaults = SyncConfig::default();
        let weekly_day = match env::var("SYNC_WEEKLY_DAY") {
            Ok(day) => day.parse::<Weekday>().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("Invalid SYNC_WEEKLY_DAY '{}'", day))
            })?,
            Err(_) => defaults.weekly_day,
        };
        let transfer_keywords = env::var("TRANSFER_KEYWORDS")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.transfer_keywords);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "finance-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            store,
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed("DATABASE_MIN_CONNECTIONS", 2),
            },
            aggregator: AggregatorConfig {
                base_url: env::var("PLAID_BASE_URL")
                    .unwrap_or_else(|_| "https://sandbox.plaid.com".to_string()),
                client_id: env::var("PLAID_CLIENT_ID").unwrap_or_default(),
                secret: Secret::new(env::var("PLAID_SECRET").unwrap_or_default()),
                client_name: env::var("PLAID_CLIENT_NAME")
                    .unwrap_or_else(|_| "Finance Tracker".to_string()),
                timeout: Duration::from_secs(parsed("AGGREGATOR_TIMEOUT_SECS", 30)),
                page_size: parsed("AGGREGATOR_PAGE_SIZE", 500),
            },
            credentials: CredentialConfig {
                encryption_key: Secret::new(required("CREDENTIAL_ENCRYPTION_KEY")?),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(required("JWT_SECRET")?),
                token_ttl_days: parsed("JWT_TTL_DAYS", 7),
            },
            sync: SyncConfig {
                scheduler_enabled: parsed("SYNC_SCHEDULER_ENABLED", defaults.scheduler_enabled),
                run_hour: parsed::<u32>("SYNC_RUN_HOUR", defaults.run_hour).min(23),
                run_minute: parsed::<u32>("SYNC_RUN_MINUTE", defaults.run_minute).min(59),
                weekly_day,
                transaction_window_days: days_in_range(
                    "SYNC_TRANSACTION_WINDOW_DAYS",
                    defaults.transaction_window_days,
                    1..=3650,
                )?,
                transfer_amount_tolerance: parsed(
                    "TRANSFER_AMOUNT_TOLERANCE",
                    defaults.transfer_amount_tolerance,
                ),
                transfer_max_day_gap: days_in_range(
                    "TRANSFER_MAX_DAY_GAP",
                    defaults.transfer_max_day_gap,
                    0..=31,
                )?,
                transfer_keywords,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_defaults_match_the_documented_schedule() {
        let sync = SyncConfig::default();
        assert_eq!(sync.run_hour, 2);
        assert_eq!(sync.weekly_day, Weekday::Sun);
        assert_eq!(sync.transaction_window_days, 30);
        assert_eq!(sync.transfer_amount_tolerance, Decimal::new(3, 2));
        assert_eq!(sync.transfer_keywords, vec!["transfer", "payment"]);
    }

    #[test]
    fn parsed_falls_back_on_garbage() {
        std::env::set_var("FINANCE_TEST_PARSED_GARBAGE", "not-a-number");
        assert_eq!(parsed::<u32>("FINANCE_TEST_PARSED_GARBAGE", 7), 7);
        std::env::remove_var("FINANCE_TEST_PARSED_GARBAGE");
    }

    #[test]
    fn day_counts_outside_their_range_are_rejected() {
        std::env::set_var("FINANCE_TEST_WINDOW_NEGATIVE", "-5");
        std::env::set_var("FINANCE_TEST_WINDOW_HUGE", "9999999999999");
        std::env::set_var("FINANCE_TEST_WINDOW_GARBAGE", "soon");
        for key in [
            "FINANCE_TEST_WINDOW_NEGATIVE",
            "FINANCE_TEST_WINDOW_HUGE",
            "FINANCE_TEST_WINDOW_GARBAGE",
        ] {
            let result = days_in_range(key, 30, 1..=3650);
            assert!(matches!(result, Err(AppError::ConfigError(_))), "{} accepted", key);
            std::env::remove_var(key);
        }
    }

    #[test]
    fn day_counts_in_range_or_unset_are_accepted() {
        std::env::set_var("FINANCE_TEST_WINDOW_OK", " 90 ");
        assert_eq!(days_in_range("FINANCE_TEST_WINDOW_OK", 30, 1..=3650).unwrap(), 90);
        std::env::remove_var("FINANCE_TEST_WINDOW_OK");
        assert_eq!(days_in_range("FINANCE_TEST_WINDOW_UNSET", 30, 1..=3650).unwrap(), 30);
        std::env::set_var("FINANCE_TEST_GAP_ZERO", "0");
        assert_eq!(days_in_range("FINANCE_TEST_GAP_ZERO", 1, 0..=31).unwrap(), 0);
        std::env::remove_var("FINANCE_TEST_GAP_ZERO");
    }
}
