//! Finance Service - bank account aggregation, balance history and spending dashboards.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod sync;
