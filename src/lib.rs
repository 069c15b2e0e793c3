//! athena-datasource - an Amazon Athena query driver for dashboards.
//!
//! Resolves named queries, runs them (or reuses a cached execution), polls
//! until completion and shapes the results as time series or tables.

pub mod athena;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod datasource;
pub mod error;
pub mod logging;
pub mod query;
pub mod result;
