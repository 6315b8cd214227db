//! HTTP handlers for finance-service.

pub mod accounts;
pub mod auth;
pub mod health;
pub mod link;
pub mod manual_assets;
pub mod reports;
pub mod sync;
pub mod transactions;
