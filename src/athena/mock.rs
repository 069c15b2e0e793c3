//! Mock Athena client for testing.
//!
//! Provides an in-memory service with scripted execution states and a call
//! log, so tests can assert which remote operations were issued.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AthenaClient, ClientFactory, NamedQuery, NamedQueryPage, QueryState, RawResultSet, ResultPage,
    StartExecution, WorkGroup,
};
use crate::error::{DatasourceError, Result};
use crate::query::QueryOption;

/// A remote operation observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Start { query_string: String, work_group: String },
    GetState(String),
    GetResults(String),
    ListNamedQueries(String),
    BatchGet(Vec<String>),
    GetWorkGroup(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    states: HashMap<String, VecDeque<QueryState>>,
}

/// A mock client that serves predefined named queries, work groups and results.
#[derive(Default)]
pub struct MockAthenaClient {
    named_queries: Vec<NamedQuery>,
    work_groups: HashMap<String, WorkGroup>,
    results: HashMap<String, Vec<RawResultSet>>,
    default_result: Option<RawResultSet>,
    state_script: Vec<QueryState>,
    state_delay: Option<Duration>,
    page_size: Option<usize>,
    fail_list: bool,
    fail_state_check: bool,
    next_handle: AtomicUsize,
    state: Mutex<MockState>,
}

impl MockAthenaClient {
    /// Creates an empty mock; executions succeed on the first status check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named query definition. Listing order is registration order.
    pub fn with_named_query(mut self, query: NamedQuery) -> Self {
        self.named_queries.push(query);
        self
    }

    /// Registers a work group with an optional output location.
    pub fn with_work_group(mut self, name: &str, output_location: Option<&str>) -> Self {
        self.work_groups.insert(
            name.to_string(),
            WorkGroup {
                name: name.to_string(),
                output_location: output_location.map(String::from),
            },
        );
        self
    }

    /// Sets the single-page result served for an execution handle.
    pub fn with_result(mut self, handle: &str, result: RawResultSet) -> Self {
        self.results.insert(handle.to_string(), vec![result]);
        self
    }

    /// Sets a multi-page result served for an execution handle.
    pub fn with_result_pages(mut self, handle: &str, pages: Vec<RawResultSet>) -> Self {
        self.results.insert(handle.to_string(), pages);
        self
    }

    /// Sets the result served for handles without an explicit result.
    pub fn with_default_result(mut self, result: RawResultSet) -> Self {
        self.default_result = Some(result);
        self
    }

    /// Sets the states reported by successive status checks of every new
    /// execution. The last state repeats once the script is exhausted.
    pub fn with_state_script(mut self, states: Vec<QueryState>) -> Self {
        self.state_script = states;
        self
    }

    /// Delays every status check by `delay`, like a slow service.
    pub fn with_state_delay(mut self, delay: Duration) -> Self {
        self.state_delay = Some(delay);
        self
    }

    /// Splits named-query listings into pages of the given size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Makes every listing call fail.
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Makes every status check fail.
    pub fn failing_state_check(mut self) -> Self {
        self.fail_state_check = true;
        self
    }

    /// Returns every call observed so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the number of executions started.
    pub fn start_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Start { .. }))
    }

    /// Returns the number of status checks issued.
    pub fn state_check_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::GetState(_)))
    }

    /// Returns the handles results were fetched for, in call order.
    pub fn fetched_handles(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::GetResults(handle) => Some(handle.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: MockCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl AthenaClient for MockAthenaClient {
    async fn start_query_execution(&self, request: &StartExecution) -> Result<String> {
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = format!("exec-{n}");

        let mut state = self.state.lock();
        state.calls.push(MockCall::Start {
            query_string: request.query_string.clone(),
            work_group: request.work_group.clone(),
        });
        state
            .states
            .insert(handle.clone(), self.state_script.iter().copied().collect());
        Ok(handle)
    }

    async fn get_query_state(&self, execution_id: &str) -> Result<QueryState> {
        if let Some(delay) = self.state_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.calls.push(MockCall::GetState(execution_id.to_string()));
        if self.fail_state_check {
            return Err(DatasourceError::remote("status check unavailable"));
        }

        let script = state.states.entry(execution_id.to_string()).or_default();
        let current = match script.len() {
            0 => QueryState::Succeeded,
            1 => script[0],
            _ => script.pop_front().unwrap_or(QueryState::Succeeded),
        };
        Ok(current)
    }

    async fn get_query_results(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage> {
        self.record(MockCall::GetResults(execution_id.to_string()));

        let pages = match self.results.get(execution_id) {
            Some(pages) => pages.clone(),
            None => match &self.default_result {
                Some(result) => vec![result.clone()],
                None => {
                    return Err(DatasourceError::remote(format!(
                        "QueryExecution {execution_id} was not found"
                    )))
                }
            },
        };

        let index: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let result_set = pages.get(index).cloned().unwrap_or_default();
        let next_token = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(ResultPage {
            result_set,
            next_token,
        })
    }

    async fn list_named_queries(
        &self,
        work_group: &str,
        next_token: Option<&str>,
    ) -> Result<NamedQueryPage> {
        self.record(MockCall::ListNamedQueries(work_group.to_string()));
        if self.fail_list {
            return Err(DatasourceError::remote("AccessDeniedException"));
        }

        let ids: Vec<String> = self
            .named_queries
            .iter()
            .filter(|q| q.work_group == work_group)
            .map(|q| q.named_query_id.clone())
            .collect();

        let start: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let size = self.page_size.unwrap_or(ids.len().max(1));
        let end = (start + size).min(ids.len());
        let next_token = (end < ids.len()).then(|| end.to_string());
        Ok(NamedQueryPage {
            ids: ids.get(start..end).map(<[String]>::to_vec).unwrap_or_default(),
            next_token,
        })
    }

    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>> {
        self.record(MockCall::BatchGet(ids.to_vec()));
        Ok(ids
            .iter()
            .filter_map(|id| self.named_queries.iter().find(|q| &q.named_query_id == id))
            .cloned()
            .collect())
    }

    async fn get_work_group(&self, name: &str) -> Result<WorkGroup> {
        self.record(MockCall::GetWorkGroup(name.to_string()));
        self.work_groups
            .get(name)
            .cloned()
            .ok_or_else(|| DatasourceError::remote(format!("WorkGroup {name} is not found")))
    }
}

/// A factory that hands out the same client for every query.
pub struct StaticClientFactory {
    client: Arc<dyn AthenaClient>,
}

impl StaticClientFactory {
    pub fn new(client: Arc<dyn AthenaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn client_for(&self, _opt: &QueryOption) -> Result<Arc<dyn AthenaClient>> {
        Ok(Arc::clone(&self.client))
    }
}
