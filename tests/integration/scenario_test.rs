//! End-to-end query scenarios against the mock service.

use std::sync::Arc;
use std::time::Duration;

use athena_datasource::athena::{
    MockAthenaClient, MockCall, NamedQuery, QueryState, RawColumn, RawResultSet,
};
use athena_datasource::query::{
    CacheEntry, CacheStore, PollPolicy, QueryDispatcher, QueryMode, QueryOption, TimeRange,
};
use athena_datasource::result::{to_table, to_time_series, ColumnKind};
use chrono::{Duration as TtlDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn dispatcher() -> QueryDispatcher {
    QueryDispatcher::new(
        Arc::new(CacheStore::new(TtlDuration::hours(12))),
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(100),
        },
    )
}

fn header_and_one_row() -> RawResultSet {
    RawResultSet::with_header(
        vec![
            RawColumn::new("time", "timestamp"),
            RawColumn::new("metric", "varchar"),
            RawColumn::new("value", "double"),
        ],
        vec![vec!["2024-01-01 00:00:00", "cpu", "0.5"]],
    )
}

fn directory() -> MockAthenaClient {
    MockAthenaClient::new()
        .with_named_query(NamedQuery::new("id-1", "Q1", "SELECT * FROM metrics", "G1"))
        .with_work_group("G1", Some("s3://results/"))
}

#[tokio::test]
async fn test_fresh_named_query_is_executed_and_cached() {
    let d = dispatcher();
    let client = directory().with_result("exec-1", header_and_one_row());
    let before = Utc::now();

    let result = d
        .handle(&client, &QueryOption::named("Q1", "G1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.start_count(), 1);
    assert_eq!(client.state_check_count(), 1);
    assert_eq!(result.rows.len(), 1);

    let entry = d.cache().get("id-1").unwrap();
    assert_eq!(entry.execution_id, "exec-1");
    assert!(entry.expires_at >= before + TtlDuration::hours(12));
    assert!(
        client.calls().contains(&MockCall::Start {
            query_string: "SELECT * FROM metrics".to_string(),
            work_group: "G1".to_string(),
        })
    );
}

#[tokio::test]
async fn test_cached_named_query_reuses_handle() {
    let d = dispatcher();
    d.cache().put(
        "id-1",
        CacheEntry {
            query_name: "Q1".to_string(),
            work_group: "G1".to_string(),
            execution_id: "handle-old".to_string(),
            expires_at: Utc::now() + TtlDuration::hours(1),
        },
    );
    let client = directory().with_result("handle-old", header_and_one_row());

    let result = d
        .handle(&client, &QueryOption::named("Q1", "G1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.start_count(), 0);
    assert_eq!(client.fetched_handles(), vec!["handle-old"]);
    assert_eq!(result.rows.len(), 1);
}

#[tokio::test]
async fn test_metrics_listing() {
    let client = MockAthenaClient::new()
        .with_named_query(NamedQuery::new("id-a", "A", "SELECT 1", "G1"))
        .with_named_query(NamedQuery::new("id-b", "B", "SELECT 2", "G1"));
    let opt = QueryOption {
        mode: QueryMode::Metrics,
        work_group: "G1".to_string(),
        ..QueryOption::default()
    };

    let result = dispatcher()
        .handle(&client, &opt, &CancellationToken::new())
        .await
        .unwrap();
    let table = to_table(&result);

    let rows: Vec<Vec<&str>> = table
        .rows
        .iter()
        .map(|r| r.values.iter().map(|v| v.string_value.as_str()).collect())
        .collect();
    assert_eq!(rows, vec![vec!["A", "A"], vec!["B", "B"]]);
    assert!(table.rows[0].values.iter().all(|v| v.kind == ColumnKind::String));
}

#[tokio::test]
async fn test_named_query_to_series_within_window() {
    let raw = RawResultSet::with_header(
        vec![
            RawColumn::new("time", "timestamp"),
            RawColumn::new("metric", "varchar"),
            RawColumn::new("host", "varchar"),
            RawColumn::new("value", "double"),
        ],
        vec![
            vec!["2024-01-01 00:02:00", "cpu", "web-1", "0.9"],
            vec!["2024-01-01 00:01:00", "cpu", "web-1", "0.7"],
            vec!["2023-12-31 23:00:00", "cpu", "web-1", "0.1"],
        ],
    );
    let client = directory().with_default_result(raw);
    let opt = QueryOption {
        time_range: TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        ),
        ..QueryOption::named("Q1", "G1")
    };

    let result = dispatcher()
        .handle(&client, &opt, &CancellationToken::new())
        .await
        .unwrap();
    let series = to_time_series(&result);

    assert_eq!(series.len(), 1);
    assert_eq!(series[0].name, "cpu value");
    assert_eq!(series[0].tags.get("host").map(String::as_str), Some("web-1"));
    let values: Vec<f64> = series[0].points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![0.7, 0.9]);
}

#[tokio::test]
async fn test_cancel_during_polling_leaves_cache_untouched() {
    let d = QueryDispatcher::new(
        Arc::new(CacheStore::new(TtlDuration::hours(12))),
        PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(30),
        },
    );
    let client = directory().with_state_script(vec![QueryState::Running]);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = d
        .handle(&client, &QueryOption::named("Q1", "G1"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "Cancelled");
    assert!(d.cache().is_empty());
    assert_eq!(client.start_count(), 1);
}

#[tokio::test]
async fn test_recreated_query_executes_under_new_identifier() {
    let d = dispatcher();
    d.cache().put(
        "id-0",
        CacheEntry {
            query_name: "Q1".to_string(),
            work_group: "G1".to_string(),
            execution_id: "handle-orphan".to_string(),
            expires_at: Utc::now() + TtlDuration::hours(1),
        },
    );
    let client = directory().with_default_result(header_and_one_row());

    d.handle(&client, &QueryOption::named("Q1", "G1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.start_count(), 1);
    assert!(d.cache().get("id-0").is_none());
    assert_eq!(d.cache().len(), 1);
}
