//! Integration tests for the Athena datasource.

pub mod batch_test;
pub mod live_test;
pub mod scenario_test;
