//! Balance and transaction synchronisation with the aggregator.
//!
//! [`SyncEngine`] runs one user at a time: the balance reconciler (which
//! finishes with the gap filler) and then the transaction importer.
//! [`SyncScheduler`] drives it for every user on the daily and weekly
//! cadences.

pub mod balances;
pub mod categories;
pub mod gap_fill;
pub mod importer;
pub mod orchestrator;
pub mod scheduler;
pub mod transfer;

pub use balances::BalanceSyncReport;
pub use categories::normalize_category;
pub use gap_fill::forward_fill;
pub use importer::{to_ledger_amount, TransactionSyncReport};
pub use orchestrator::{SyncEngine, SyncRunReport, UserSyncReport};
pub use scheduler::{next_fire_after, SyncScheduler, Trigger};
pub use transfer::{TransferCandidate, TransferRules};

use crate::services::{AggregatorError, CredentialError};
use service_core::error::AppError;
use thiserror::Error;

/// Why one institution could not be synced.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl SyncError {
    /// Fetch and decrypt failures put the institution into `error`.
    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, SyncError::Store(_))
    }
}
