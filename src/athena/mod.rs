//! Athena service abstraction.
//!
//! Provides a trait-based interface over the remote query service, allowing
//! the HTTP client and the in-memory mock to be used interchangeably.

mod client;
mod mock;
mod signing;
mod types;

pub(crate) use client::signed_post;
pub use client::{HttpAthenaClient, HttpClientFactory};
pub use mock::{MockAthenaClient, MockCall, StaticClientFactory};
pub use signing::SigningParams;
pub use types::{
    NamedQuery, NamedQueryPage, QueryState, RawColumn, RawResultSet, ResultPage, StartExecution,
    WorkGroup,
};

use std::sync::Arc;

use crate::error::Result;
use crate::query::QueryOption;
use async_trait::async_trait;

/// Trait defining the remote operations the datasource relies on.
///
/// All operations are async and return Results with DatasourceError.
#[async_trait]
pub trait AthenaClient: Send + Sync {
    /// Starts an execution and returns its execution handle.
    async fn start_query_execution(&self, request: &StartExecution) -> Result<String>;

    /// Fetches the current state of an execution.
    async fn get_query_state(&self, execution_id: &str) -> Result<QueryState>;

    /// Fetches one page of an execution's results.
    async fn get_query_results(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage>;

    /// Lists one page of named-query identifiers in a work group.
    async fn list_named_queries(
        &self,
        work_group: &str,
        next_token: Option<&str>,
    ) -> Result<NamedQueryPage>;

    /// Fetches the definitions of up to 50 named queries.
    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>>;

    /// Fetches a work group's configuration.
    async fn get_work_group(&self, name: &str) -> Result<WorkGroup>;
}

/// Builds a client bound to the region and credentials of one query.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client_for(&self, opt: &QueryOption) -> Result<Arc<dyn AthenaClient>>;
}
