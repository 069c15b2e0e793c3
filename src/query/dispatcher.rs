//! Routes a query option to the operation its mode names.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cache::CacheStore;
use super::cancellable;
use super::executor::{ExecutionEngine, PollPolicy};
use super::option::{QueryMode, QueryOption};
use super::resolver::NamedQueryResolver;
use crate::athena::{AthenaClient, NamedQuery};
use crate::error::{DatasourceError, Result};
use crate::result::{parse_result_set, ColumnInfo, ColumnKind, NormalizedResult};

/// Handles individual queries against a shared execution cache.
#[derive(Clone)]
pub struct QueryDispatcher {
    cache: Arc<CacheStore>,
    policy: PollPolicy,
}

impl QueryDispatcher {
    pub fn new(cache: Arc<CacheStore>, policy: PollPolicy) -> Self {
        Self { cache, policy }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Handles one query. Expired cache entries are purged afterwards,
    /// whatever the outcome.
    pub async fn handle(
        &self,
        client: &dyn AthenaClient,
        opt: &QueryOption,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult> {
        let result = match opt.mode {
            QueryMode::Named => self.handle_named(client, opt, cancel).await,
            QueryMode::Execution => self.handle_execution(client, opt, cancel).await,
            QueryMode::Metrics => self.handle_metrics(client, opt, cancel).await,
            QueryMode::ConnectionTest => self.handle_connection_test(client, opt, cancel).await,
        };
        self.cache.sweep();
        result
    }

    async fn handle_named(
        &self,
        client: &dyn AthenaClient,
        opt: &QueryOption,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult> {
        if !opt.is_valid_named_query() {
            return Err(DatasourceError::invalid_query(
                "named query and work group are required",
            ));
        }

        let resolver = NamedQueryResolver::new(client);
        let query = cancellable(cancel, resolver.resolve(&opt.named_query, &opt.work_group)).await?;
        self.cache
            .reconcile(&query.name, &query.work_group, &query.named_query_id);

        let engine = ExecutionEngine::new(client, self.policy, cancel);
        let handle = match self.cached_handle(opt, &query) {
            Some(handle) => handle,
            None => self.execute_once(client, &engine, opt, &query, cancel).await?,
        };

        let raw = engine.fetch_results(&handle).await?;
        Ok(parse_result_set(opt, raw))
    }

    /// Executes `query` while holding its flight lock, unless a concurrent
    /// holder already left a fresh execution in the cache.
    async fn execute_once(
        &self,
        client: &dyn AthenaClient,
        engine: &ExecutionEngine<'_>,
        opt: &QueryOption,
        query: &NamedQuery,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let flight = self.cache.flight(&query.named_query_id);
        let _guard = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(DatasourceError::Cancelled),
            guard = flight.lock() => guard,
        };

        if let Some(handle) = self.cached_handle(opt, query) {
            debug!(query = %query.name, handle = %handle, "Reusing execution from concurrent request");
            return Ok(handle);
        }

        let work_group = cancellable(cancel, client.get_work_group(&query.work_group)).await?;
        engine.execute_cached(query, &work_group, &self.cache).await
    }

    fn cached_handle(&self, opt: &QueryOption, query: &NamedQuery) -> Option<String> {
        if !opt.use_cache {
            return None;
        }
        let entry = self.cache.get_fresh(&query.named_query_id)?;
        info!(
            query = %query.name,
            handle = %entry.execution_id,
            expires_at = %entry.expires_at,
            "Cache hit"
        );
        Some(entry.execution_id)
    }

    async fn handle_execution(
        &self,
        client: &dyn AthenaClient,
        opt: &QueryOption,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult> {
        if !opt.is_valid_execution_query() {
            return Err(DatasourceError::invalid_query("execution id is required"));
        }
        let engine = ExecutionEngine::new(client, self.policy, cancel);
        let raw = engine.fetch_results(&opt.execution_id).await?;
        Ok(parse_result_set(opt, raw))
    }

    async fn handle_metrics(
        &self,
        client: &dyn AthenaClient,
        opt: &QueryOption,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult> {
        let resolver = NamedQueryResolver::new(client);
        let queries = cancellable(cancel, resolver.list(&opt.work_group)).await?;

        Ok(NormalizedResult {
            columns: vec![
                ColumnInfo::new("text", ColumnKind::String),
                ColumnInfo::new("value", ColumnKind::String),
            ],
            rows: queries
                .into_iter()
                .map(|q| vec![q.name.clone(), q.name])
                .collect(),
            option: opt.clone(),
        })
    }

    async fn handle_connection_test(
        &self,
        client: &dyn AthenaClient,
        opt: &QueryOption,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult> {
        cancellable(cancel, client.list_named_queries(&opt.work_group, None)).await?;
        debug!(work_group = %opt.work_group, "Connection test succeeded");
        Ok(NormalizedResult::empty(opt.clone()))
    }
}
