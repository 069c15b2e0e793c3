//! Host batches through the datasource coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use athena_datasource::athena::{
    MockAthenaClient, NamedQuery, RawColumn, RawResultSet, StaticClientFactory,
};
use athena_datasource::datasource::{Datasource, DatasourceRequest};
use athena_datasource::query::{CacheStore, PollPolicy, QueryDispatcher, TimeRange};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn datasource(client: Arc<MockAthenaClient>) -> Datasource {
    let dispatcher = QueryDispatcher::new(
        Arc::new(CacheStore::new(chrono::Duration::hours(12))),
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        },
    );
    Datasource::new(Arc::new(StaticClientFactory::new(client)), dispatcher)
}

fn client() -> Arc<MockAthenaClient> {
    Arc::new(
        MockAthenaClient::new()
            .with_named_query(NamedQuery::new("id-1", "latency", "SELECT 1", "analytics"))
            .with_work_group("analytics", Some("s3://results/"))
            .with_default_result(RawResultSet::with_header(
                vec![
                    RawColumn::new("time", "timestamp"),
                    RawColumn::new("metric", "varchar"),
                    RawColumn::new("p99", "double"),
                ],
                vec![vec!["2024-01-01 00:00:00", "api", "120.5"]],
            )),
    )
}

fn request(queries: Vec<serde_json::Value>) -> DatasourceRequest {
    DatasourceRequest {
        time_range: TimeRange::default(),
        datasource_json: json!({"region": "us-east-1", "workGroup": "analytics"}).to_string(),
        secure_json: HashMap::new(),
        queries: queries.into_iter().map(|q| q.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_batch_renders_each_format() {
    let client = client();
    let ds = datasource(Arc::clone(&client));
    let req = request(vec![
        json!({"refId": "A", "queryType": "NamedQuery", "namedQuery": "latency"}),
        json!({"refId": "B", "queryType": "NamedQuery", "namedQuery": "latency", "format": "table"}),
    ]);

    let response = ds.query(&req, &CancellationToken::new()).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["results"][0]["refId"], "A");
    assert_eq!(json["results"][0]["series"][0]["name"], "api p99");
    assert_eq!(
        json["results"][0]["series"][0]["points"],
        json!([{"timestamp": 1_704_067_200_000i64, "value": 120.5}])
    );
    assert_eq!(json["results"][1]["refId"], "B");
    assert_eq!(json["results"][1]["tables"][0]["rows"][0]["values"][2]["doubleValue"], 120.5);
    assert_eq!(
        json["results"][1]["metaJson"],
        r#"{"colInfos":[{"colName":"time","colType":2},{"colName":"metric","colType":4},{"colName":"p99","colType":1}]}"#
    );

    // The second query reuses the first query's execution.
    assert_eq!(client.start_count(), 1);
}

#[tokio::test]
async fn test_unsupported_format_reported_per_query() {
    let ds = datasource(client());
    let req = request(vec![
        json!({"refId": "A", "queryType": "NamedQuery", "namedQuery": "latency", "format": "heatmap"}),
        json!({"refId": "B", "queryType": "GetNamedQueryMetrics"}),
    ]);

    let response = ds.query(&req, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        response.results[0].error.as_deref(),
        Some("Unsupported format: heatmap")
    );
    assert_eq!(response.results[1].error, None);
    assert_eq!(response.results[1].series.len(), 0);
}

#[tokio::test]
async fn test_malformed_settings_fail_batch() {
    let ds = datasource(client());
    let mut req = request(vec![json!({"refId": "A"})]);
    req.datasource_json = "[1, 2]".to_string();

    let err = ds.query(&req, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.category(), "Configuration Error");
}
