//! Services module for finance-service.

pub mod aggregator;
pub mod auth;
pub mod credentials;
pub mod database;
pub mod filter;
pub mod memory;
pub mod metrics;
pub mod reports;
pub mod store;

pub use aggregator::{
    Aggregator, AggregatorError, PlaidClient, ProviderAccount, ProviderBalance,
    ProviderTransaction, TokenExchange,
};
pub use auth::{hash_password, verify_password, SessionClaims, TokenService};
pub use credentials::{CredentialCipher, CredentialError};
pub use database::Database;
pub use filter::{TransactionFilter, TransactionPage, TransactionQuery};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::Store;
