//! Tests against a real Athena work group.
//!
//! Set `ATHENA_TEST_WORK_GROUP` (and optionally `ATHENA_TEST_NAMED_QUERY`)
//! together with the usual AWS credential and region variables.

use std::sync::Arc;

use athena_datasource::athena::{ClientFactory, HttpAthenaClient, HttpClientFactory};
use athena_datasource::credentials::DefaultCredentialsProvider;
use athena_datasource::query::{CacheStore, PollPolicy, QueryDispatcher, QueryMode, QueryOption};
use tokio_util::sync::CancellationToken;

struct LiveTarget {
    factory: HttpClientFactory,
    region: String,
    work_group: String,
}

fn live_target() -> Option<LiveTarget> {
    let work_group = std::env::var("ATHENA_TEST_WORK_GROUP").ok()?;
    let region = std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .ok()?;
    let http = HttpAthenaClient::http_client().ok()?;
    let factory = HttpClientFactory::new(
        http.clone(),
        Arc::new(DefaultCredentialsProvider::new(http)),
    );
    Some(LiveTarget {
        factory,
        region,
        work_group,
    })
}

fn dispatcher() -> QueryDispatcher {
    QueryDispatcher::new(
        Arc::new(CacheStore::new(chrono::Duration::hours(12))),
        PollPolicy::default(),
    )
}

#[tokio::test]
async fn test_live_connection() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: ATHENA_TEST_WORK_GROUP not set");
        return;
    };

    let mut opt = QueryOption {
        mode: QueryMode::ConnectionTest,
        work_group: target.work_group.clone(),
        ..QueryOption::default()
    };
    opt.connection.region = target.region.clone();

    let client = target.factory.client_for(&opt).await.unwrap();
    let result = dispatcher()
        .handle(client.as_ref(), &opt, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn test_live_named_query_cached_on_second_run() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: ATHENA_TEST_WORK_GROUP not set");
        return;
    };
    let Ok(name) = std::env::var("ATHENA_TEST_NAMED_QUERY") else {
        eprintln!("Skipping test: ATHENA_TEST_NAMED_QUERY not set");
        return;
    };

    let mut opt = QueryOption::named(name, target.work_group.clone());
    opt.connection.region = target.region.clone();

    let client = target.factory.client_for(&opt).await.unwrap();
    let d = dispatcher();
    let cancel = CancellationToken::new();

    let first = d.handle(client.as_ref(), &opt, &cancel).await.unwrap();
    assert_eq!(d.cache().len(), 1);
    let second = d.handle(client.as_ref(), &opt, &cancel).await.unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(d.cache().len(), 1);
}
