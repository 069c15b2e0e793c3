//! Query execution and polling.
//!
//! An execution moves `Submitted → Polling → {Succeeded, Failed, TimedOut}`.
//! Polling runs on the caller's task: a bounded loop that sleeps a fixed
//! interval between status checks and races every wait against the
//! caller's cancellation token.

use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::CacheStore;
use super::cancellable;
use crate::athena::{AthenaClient, NamedQuery, QueryState, RawResultSet, StartExecution, WorkGroup};
use crate::error::{DatasourceError, Result};

/// Delay between two status checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wall-clock budget for an execution to succeed.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval and budget of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: POLL_TIMEOUT,
        }
    }
}

impl PollPolicy {
    /// Number of status checks that fit in the budget, rounded up.
    pub fn max_polls(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let polls = self.timeout.as_millis().div_ceil(interval);
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

/// Lifecycle phase of one execution, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Submits named queries, waits for them and retrieves results.
pub struct ExecutionEngine<'a> {
    client: &'a dyn AthenaClient,
    policy: PollPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(client: &'a dyn AthenaClient, policy: PollPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            client,
            policy,
            cancel,
        }
    }

    /// Starts an execution of `query`, writing results to the work group's
    /// output location.
    pub async fn submit(&self, query: &NamedQuery, work_group: &WorkGroup) -> Result<String> {
        let output_location = work_group
            .output_location
            .clone()
            .ok_or_else(|| DatasourceError::MissingOutputLocation(work_group.name.clone()))?;

        let request = StartExecution {
            query_string: query.query_string.clone(),
            work_group: query.work_group.clone(),
            output_location,
            database: query.database.clone(),
        };
        let handle = cancellable(self.cancel, self.client.start_query_execution(&request)).await?;
        info!(
            query = %query.name,
            handle = %handle,
            phase = %ExecutionPhase::Submitted,
            "Started execution"
        );
        Ok(handle)
    }

    /// Polls `handle` until it succeeds, fails, runs out of budget or the
    /// caller cancels.
    ///
    /// The budget is wall-clock time: a slow status check is abandoned once
    /// the remaining budget is spent.
    pub async fn wait_for_completion(&self, handle: &str) -> Result<()> {
        let started = Instant::now();
        let timeout = self.policy.timeout;
        let max_polls = self.policy.max_polls();
        let mut last_state = QueryState::Queued;

        for attempt in 1..=max_polls {
            let remaining = timeout.saturating_sub(started.elapsed());
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!(handle, phase = %ExecutionPhase::Cancelled, "Stopped waiting");
                    return Err(DatasourceError::Cancelled);
                }
                _ = tokio::time::sleep(self.policy.interval.min(remaining)) => {}
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let check = cancellable(self.cancel, self.client.get_query_state(handle));
            let state = match tokio::time::timeout(remaining, check).await {
                Ok(Ok(state)) => state,
                Ok(Err(DatasourceError::Cancelled)) => return Err(DatasourceError::Cancelled),
                Ok(Err(e)) => {
                    warn!(handle, error = %e, phase = %ExecutionPhase::Failed, "Status check failed");
                    return Err(DatasourceError::ExecutionFailed {
                        handle: handle.to_string(),
                        state: QueryState::Failed,
                    });
                }
                Err(_) => {
                    debug!(handle, attempt, "Status check outlived the budget");
                    break;
                }
            };
            debug!(handle, attempt, state = %state, phase = %ExecutionPhase::Polling, "Waiting...");
            last_state = state;

            match state {
                QueryState::Succeeded => {
                    debug!(handle, phase = %ExecutionPhase::Succeeded, "Execution succeeded");
                    return Ok(());
                }
                state if state.is_terminal() => {
                    warn!(handle, state = %state, phase = %ExecutionPhase::Failed, "Execution failed");
                    return Err(DatasourceError::ExecutionFailed {
                        handle: handle.to_string(),
                        state,
                    });
                }
                _ => {}
            }

            if started.elapsed() >= timeout {
                break;
            }
        }

        let elapsed_ms = started.elapsed().as_millis();
        warn!(handle, elapsed_ms = elapsed_ms as u64, phase = %ExecutionPhase::TimedOut, "Execution timed out");
        Err(DatasourceError::TimedOut {
            handle: handle.to_string(),
            state: last_state,
            elapsed_ms,
        })
    }

    /// Submits `query` and waits for it, returning the execution handle.
    pub async fn execute(&self, query: &NamedQuery, work_group: &WorkGroup) -> Result<String> {
        let handle = self.submit(query, work_group).await?;
        self.wait_for_completion(&handle).await?;
        Ok(handle)
    }

    /// Like [`execute`](Self::execute), then records the handle in `cache`
    /// under the query's identifier.
    pub async fn execute_cached(
        &self,
        query: &NamedQuery,
        work_group: &WorkGroup,
        cache: &CacheStore,
    ) -> Result<String> {
        let handle = self.execute(query, work_group).await?;
        if self.cancel.is_cancelled() {
            return Err(DatasourceError::Cancelled);
        }
        cache.record_execution(&query.named_query_id, &query.name, &query.work_group, &handle);
        debug!(query = %query.name, handle = %handle, "Cached execution");
        Ok(handle)
    }

    /// Retrieves the full result payload of an execution.
    ///
    /// Later pages are appended to the first; only the first page carries
    /// the header row.
    pub async fn fetch_results(&self, handle: &str) -> Result<RawResultSet> {
        let first = cancellable(self.cancel, self.client.get_query_results(handle, None)).await?;
        let mut result = first.result_set;
        let mut next_token = first.next_token;

        while let Some(token) = next_token {
            let page =
                cancellable(self.cancel, self.client.get_query_results(handle, Some(&token)))
                    .await?;
            result.rows.extend(page.result_set.rows);
            next_token = page.next_token;
        }

        debug!(handle, rows = result.rows.len(), "Retrieved results");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athena::{MockAthenaClient, RawColumn};
    use chrono::Duration as TtlDuration;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    fn query() -> NamedQuery {
        NamedQuery::new("id-1", "Q1", "SELECT 1", "G1")
    }

    fn group(output: Option<&str>) -> WorkGroup {
        WorkGroup {
            name: "G1".to_string(),
            output_location: output.map(String::from),
        }
    }

    #[test]
    fn test_max_polls_rounds_up() {
        assert_eq!(PollPolicy::default().max_polls(), 120);
        let policy = PollPolicy {
            interval: Duration::from_millis(400),
            timeout: Duration::from_millis(1000),
        };
        assert_eq!(policy.max_polls(), 3);
    }

    #[tokio::test]
    async fn test_submit_requires_output_location() {
        let client = MockAthenaClient::new();
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let err = engine.submit(&query(), &group(None)).await.unwrap_err();

        assert!(matches!(err, DatasourceError::MissingOutputLocation(ref g) if g == "G1"));
        assert_eq!(client.start_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_polls_until_success() {
        let client = MockAthenaClient::new().with_state_script(vec![
            QueryState::Queued,
            QueryState::Running,
            QueryState::Succeeded,
        ]);
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let handle = engine
            .execute(&query(), &group(Some("s3://out/")))
            .await
            .unwrap();

        assert_eq!(handle, "exec-1");
        assert_eq!(client.state_check_count(), 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_stops_polling() {
        let client = MockAthenaClient::new()
            .with_state_script(vec![QueryState::Running, QueryState::Failed]);
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let err = engine
            .execute(&query(), &group(Some("s3://out/")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DatasourceError::ExecutionFailed { state: QueryState::Failed, .. }
        ));
        assert_eq!(client.state_check_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_reports_last_state() {
        let client = MockAthenaClient::new().with_state_script(vec![QueryState::Running]);
        let cancel = CancellationToken::new();
        let policy = PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        };
        let engine = ExecutionEngine::new(&client, policy, &cancel);

        let err = engine
            .execute(&query(), &group(Some("s3://out/")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DatasourceError::TimedOut { state: QueryState::Running, .. }
        ));
        let checks = client.state_check_count();
        assert!((1..=policy.max_polls() as usize).contains(&checks), "{checks} checks");
    }

    #[tokio::test]
    async fn test_slow_status_checks_respect_wall_clock_budget() {
        let client = MockAthenaClient::new()
            .with_state_script(vec![QueryState::Running])
            .with_state_delay(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let policy = PollPolicy {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let engine = ExecutionEngine::new(&client, policy, &cancel);

        let started = Instant::now();
        let err = engine
            .execute(&query(), &group(Some("s3://out/")))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, DatasourceError::TimedOut { .. }), "{err:?}");
        assert!(elapsed >= policy.timeout, "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
        assert!(client.state_check_count() < policy.max_polls() as usize);
    }

    #[tokio::test]
    async fn test_status_check_error_aborts_as_failed() {
        let client = MockAthenaClient::new().failing_state_check();
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let err = engine
            .execute(&query(), &group(Some("s3://out/")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DatasourceError::ExecutionFailed { state: QueryState::Failed, .. }
        ));
        assert_eq!(client.state_check_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_execution_is_not_cached() {
        let client = MockAthenaClient::new().with_state_script(vec![QueryState::Running]);
        let cancel = CancellationToken::new();
        let cache = CacheStore::new(TtlDuration::hours(12));
        let policy = PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(60),
        };
        let engine = ExecutionEngine::new(&client, policy, &cancel);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = engine
            .execute_cached(&query(), &group(Some("s3://out/")), &cache)
            .await
            .unwrap_err();

        assert!(matches!(err, DatasourceError::Cancelled));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_execute_cached_records_handle() {
        let client = MockAthenaClient::new();
        let cancel = CancellationToken::new();
        let cache = CacheStore::new(TtlDuration::hours(12));
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let handle = engine
            .execute_cached(&query(), &group(Some("s3://out/")), &cache)
            .await
            .unwrap();

        let entry = cache.get("id-1").unwrap();
        assert_eq!(entry.execution_id, handle);
        assert_eq!(entry.query_name, "Q1");
    }

    #[tokio::test]
    async fn test_fetch_results_appends_pages() {
        let columns = vec![RawColumn::new("n", "bigint")];
        let first = RawResultSet::with_header(columns.clone(), vec![vec!["1"]]);
        let second = RawResultSet {
            columns,
            rows: vec![vec![Some("2".to_string())], vec![Some("3".to_string())]],
        };
        let client = MockAthenaClient::new().with_result_pages("exec-9", vec![first, second]);
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(&client, fast_policy(), &cancel);

        let result = engine.fetch_results("exec-9").await.unwrap();

        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.rows[0], vec![Some("n".to_string())]);
        assert_eq!(result.rows[3], vec![Some("3".to_string())]);
        assert_eq!(client.fetched_handles(), vec!["exec-9", "exec-9"]);
    }
}
