//! HTTP implementation of the Athena client.
//!
//! Speaks the Athena JSON 1.1 protocol (`X-Amz-Target: AmazonAthena.*`) over
//! reqwest, signing requests with SigV4 whenever credentials are available.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::signing::{self, SigningParams};
use super::{
    AthenaClient, ClientFactory, NamedQuery, NamedQueryPage, QueryState, RawColumn, RawResultSet,
    ResultPage, StartExecution, WorkGroup,
};
use crate::credentials::{Credentials, CredentialsProvider};
use crate::error::{DatasourceError, Result};
use crate::query::QueryOption;

/// Request timeout for a single API call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AmazonAthena";

/// Athena client bound to one region and one set of credentials.
#[derive(Debug)]
pub struct HttpAthenaClient {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: Option<Credentials>,
}

impl HttpAthenaClient {
    /// Creates a client for the regional endpoint, or for `endpoint` when given.
    pub fn new(
        http: reqwest::Client,
        region: &str,
        endpoint: Option<&str>,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        if region.is_empty() {
            return Err(DatasourceError::config("region is required"));
        }
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!("https://athena.{region}.amazonaws.com/"),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| DatasourceError::config(format!("Invalid Athena endpoint: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            region: region.to_string(),
            credentials,
        })
    }

    /// Builds the shared HTTP client used for all API calls.
    pub fn http_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(DatasourceError::from)
    }

    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| DatasourceError::remote(format!("{action}: {e}")))?;
        let headers = vec![
            ("content-type".to_string(), JSON_CONTENT_TYPE.to_string()),
            (
                "x-amz-target".to_string(),
                format!("{TARGET_PREFIX}.{action}"),
            ),
        ];

        debug!(action, "Calling Athena");
        let response = signed_post(
            &self.http,
            &self.endpoint,
            &self.region,
            "athena",
            self.credentials.as_ref(),
            headers,
            body,
        )
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DatasourceError::remote(format_service_error(
                action, status, &text,
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| DatasourceError::remote(format!("{action}: malformed response: {e}")))
    }
}

/// Sends a POST, signed when credentials are given.
pub(crate) async fn signed_post(
    http: &reqwest::Client,
    url: &Url,
    region: &str,
    service: &str,
    credentials: Option<&Credentials>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
) -> Result<reqwest::Response> {
    let mut request = http.post(url.clone());
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }

    if let Some(credentials) = credentials {
        let mut to_sign = headers.clone();
        to_sign.push(("host".to_string(), host_header(url)));
        let params = SigningParams {
            credentials,
            region,
            service,
        };
        for (name, value) in signing::sign(&params, "POST", url.path(), &to_sign, &body, Utc::now())
        {
            request = request.header(name, value);
        }
    }

    Ok(request.body(body).send().await?)
}

/// The `Host` value the HTTP stack will send for this URL.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn format_service_error(action: &str, status: reqwest::StatusCode, text: &str) -> String {
    #[derive(Deserialize)]
    struct ServiceError {
        #[serde(rename = "__type")]
        kind: Option<String>,
        #[serde(alias = "Message")]
        message: Option<String>,
    }

    match serde_json::from_str::<ServiceError>(text) {
        Ok(err) => {
            let kind = err.kind.unwrap_or_else(|| status.to_string());
            // __type may be namespaced, e.g. "com.amazonaws.athena#InvalidRequestException".
            let kind = kind.rsplit('#').next().unwrap_or_default().to_string();
            match err.message {
                Some(message) => format!("{action}: {kind}: {message}"),
                None => format!("{action}: {kind}"),
            }
        }
        Err(_) => format!("{action}: HTTP {status}: {text}"),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionInput<'a> {
    query_string: &'a str,
    work_group: &'a str,
    result_configuration: ResultConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_execution_context: Option<QueryExecutionContext<'a>>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct ResultConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext<'a> {
    database: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionIdInput<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionOutput {
    query_execution_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionOutput {
    query_execution: QueryExecution,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecution {
    status: QueryExecutionStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatus {
    state: QueryState,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsOutput {
    result_set: WireResultSet,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultSet {
    #[serde(default)]
    rows: Vec<WireRow>,
    result_set_metadata: WireMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRow {
    #[serde(default)]
    data: Vec<WireDatum>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireDatum {
    #[serde(default)]
    var_char_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMetadata {
    #[serde(default)]
    column_info: Vec<WireColumn>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireColumn {
    name: String,
    #[serde(rename = "Type")]
    type_name: String,
}

impl From<WireResultSet> for RawResultSet {
    fn from(wire: WireResultSet) -> Self {
        Self {
            columns: wire
                .result_set_metadata
                .column_info
                .into_iter()
                .map(|c| RawColumn::new(c.name, c.type_name))
                .collect(),
            rows: wire
                .rows
                .into_iter()
                .map(|row| row.data.into_iter().map(|d| d.var_char_value).collect())
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListNamedQueriesInput<'a> {
    work_group: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListNamedQueriesOutput {
    #[serde(default)]
    named_query_ids: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchGetNamedQueryInput<'a> {
    named_query_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchGetNamedQueryOutput {
    #[serde(default)]
    named_queries: Vec<NamedQuery>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetWorkGroupInput<'a> {
    work_group: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetWorkGroupOutput {
    work_group: WireWorkGroup,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireWorkGroup {
    name: String,
    #[serde(default)]
    configuration: Option<WorkGroupConfiguration>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WorkGroupConfiguration {
    #[serde(default)]
    result_configuration: Option<ResultConfiguration>,
}

impl From<WireWorkGroup> for WorkGroup {
    fn from(wire: WireWorkGroup) -> Self {
        let output_location = wire
            .configuration
            .and_then(|c| c.result_configuration)
            .and_then(|r| r.output_location);
        Self {
            name: wire.name,
            output_location,
        }
    }
}

#[async_trait]
impl AthenaClient for HttpAthenaClient {
    async fn start_query_execution(&self, request: &StartExecution) -> Result<String> {
        let input = StartQueryExecutionInput {
            query_string: &request.query_string,
            work_group: &request.work_group,
            result_configuration: ResultConfiguration {
                output_location: Some(request.output_location.clone()),
            },
            query_execution_context: request
                .database
                .as_deref()
                .map(|database| QueryExecutionContext { database }),
        };
        let output: StartQueryExecutionOutput = self.call("StartQueryExecution", &input).await?;
        Ok(output.query_execution_id)
    }

    async fn get_query_state(&self, execution_id: &str) -> Result<QueryState> {
        let input = ExecutionIdInput {
            query_execution_id: execution_id,
            next_token: None,
        };
        let output: GetQueryExecutionOutput = self.call("GetQueryExecution", &input).await?;
        Ok(output.query_execution.status.state)
    }

    async fn get_query_results(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage> {
        let input = ExecutionIdInput {
            query_execution_id: execution_id,
            next_token,
        };
        let output: GetQueryResultsOutput = self.call("GetQueryResults", &input).await?;
        Ok(ResultPage {
            result_set: output.result_set.into(),
            next_token: output.next_token,
        })
    }

    async fn list_named_queries(
        &self,
        work_group: &str,
        next_token: Option<&str>,
    ) -> Result<NamedQueryPage> {
        let input = ListNamedQueriesInput {
            work_group,
            next_token,
        };
        let output: ListNamedQueriesOutput = self.call("ListNamedQueries", &input).await?;
        Ok(NamedQueryPage {
            ids: output.named_query_ids,
            next_token: output.next_token,
        })
    }

    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>> {
        let input = BatchGetNamedQueryInput {
            named_query_ids: ids,
        };
        let output: BatchGetNamedQueryOutput = self.call("BatchGetNamedQuery", &input).await?;
        Ok(output.named_queries)
    }

    async fn get_work_group(&self, name: &str) -> Result<WorkGroup> {
        let input = GetWorkGroupInput { work_group: name };
        let output: GetWorkGroupOutput = self.call("GetWorkGroup", &input).await?;
        Ok(output.work_group.into())
    }
}

/// Builds HTTP clients, resolving credentials per query.
///
/// Queries without configured credentials use the ambient environment
/// credentials, or go unsigned when there are none.
pub struct HttpClientFactory {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialsProvider>,
    endpoint: Option<String>,
}

impl HttpClientFactory {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            http,
            credentials,
            endpoint: None,
        }
    }

    /// Sends every request to `endpoint` instead of the regional one.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn client_for(&self, opt: &QueryOption) -> Result<Arc<dyn AthenaClient>> {
        let credentials = match self.credentials.resolve(opt).await? {
            Some(creds) => Some(creds),
            None => Credentials::from_env(),
        };
        let endpoint = opt
            .connection
            .endpoint
            .as_deref()
            .or(self.endpoint.as_deref());
        let client = HttpAthenaClient::new(
            self.http.clone(),
            &opt.connection.region,
            endpoint,
            credentials,
        )?;
        Ok(Arc::new(client))
    }
}
