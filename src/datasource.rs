//! Batch coordinator between the dashboard host and the query dispatcher.
//!
//! A host request carries the datasource settings, the decrypted secure
//! settings, a time range and one model per query. Each model is merged over
//! the settings into a [`QueryOption`], dispatched, and rendered in the
//! format it asks for.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::athena::ClientFactory;
use crate::error::{DatasourceError, Result};
use crate::query::{OutputFormat, QueryDispatcher, QueryOption, TimeRange};
use crate::result::{
    to_table, to_time_series, NormalizedResult, QueryResultMetadata, Table, TimeSeries,
};

/// Secure-settings key holding the static secret access key.
pub const SECRET_ACCESS_KEY: &str = "secretAccessKey";

/// One batch of queries sent by the host.
#[derive(Debug, Clone, Default)]
pub struct DatasourceRequest {
    pub time_range: TimeRange,

    /// Datasource settings as a JSON object.
    pub datasource_json: String,

    /// Decrypted secure settings.
    pub secure_json: HashMap<String, String>,

    /// Query models as JSON objects; keys override the datasource settings.
    pub queries: Vec<String>,
}

impl DatasourceRequest {
    /// Builds one option per query model.
    ///
    /// Any malformed settings or model fails the whole batch.
    pub fn build_options(&self) -> Result<Vec<QueryOption>> {
        let settings = parse_object("datasource settings", &self.datasource_json)?;
        let secret_key = self
            .secure_json
            .get(SECRET_ACCESS_KEY)
            .cloned()
            .unwrap_or_default();

        self.queries
            .iter()
            .enumerate()
            .map(|(i, model_json)| {
                let mut merged = settings.clone();
                merged.extend(parse_object(&format!("query model #{i}"), model_json)?);

                let mut opt: QueryOption = serde_json::from_value(Value::Object(merged))
                    .map_err(|e| DatasourceError::config(format!("query model #{i}: {e}")))?;
                opt.connection.secret_key = secret_key.clone();
                opt.time_range = self.time_range;
                Ok(opt)
            })
            .collect()
    }
}

fn parse_object(what: &str, json: &str) -> Result<Map<String, Value>> {
    if json.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DatasourceError::config(format!("{what} must be a JSON object"))),
        Err(e) => Err(DatasourceError::config(format!("{what}: {e}"))),
    }
}

/// The outcome of one query, in host terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ref_id: String,
    pub meta_json: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<TimeSeries>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Renders `result` in the format its option asks for.
    pub fn render(result: &NormalizedResult) -> Result<Self> {
        let opt = &result.option;
        let mut rendered = Self {
            ref_id: opt.ref_id.clone(),
            meta_json: QueryResultMetadata::from_result(result).to_json(),
            series: Vec::new(),
            tables: Vec::new(),
            error: None,
        };
        match &opt.format {
            OutputFormat::TimeSeries => rendered.series = to_time_series(result),
            OutputFormat::Table => rendered.tables = vec![to_table(result)],
            OutputFormat::Other(format) => {
                return Err(DatasourceError::UnsupportedFormat(format.clone()))
            }
        }
        Ok(rendered)
    }

    pub fn failed(ref_id: &str, error: &DatasourceError) -> Self {
        Self {
            ref_id: ref_id.to_string(),
            meta_json: String::new(),
            series: Vec::new(),
            tables: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasourceResponse {
    pub results: Vec<QueryResult>,
}

/// Runs host batches against clients built per query.
pub struct Datasource {
    factory: Arc<dyn ClientFactory>,
    dispatcher: QueryDispatcher,
}

impl Datasource {
    pub fn new(factory: Arc<dyn ClientFactory>, dispatcher: QueryDispatcher) -> Self {
        Self {
            factory,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &QueryDispatcher {
        &self.dispatcher
    }

    /// Handles every query of `request` in order.
    ///
    /// Query failures are reported in that query's result. Malformed
    /// requests, client construction failures and cancellation abort the
    /// batch.
    pub async fn query(
        &self,
        request: &DatasourceRequest,
        cancel: &CancellationToken,
    ) -> Result<DatasourceResponse> {
        let options = request.build_options()?;
        info!(queries = options.len(), "Handling batch");

        let mut results = Vec::with_capacity(options.len());
        for opt in &options {
            if cancel.is_cancelled() {
                return Err(DatasourceError::Cancelled);
            }

            let client = self.factory.client_for(opt).await?;
            let outcome = self
                .dispatcher
                .handle(client.as_ref(), opt, cancel)
                .await
                .and_then(|result| QueryResult::render(&result));

            match outcome {
                Ok(result) => {
                    debug!(ref_id = %opt.ref_id, series = result.series.len(), tables = result.tables.len(), "Query done");
                    results.push(result);
                }
                Err(e) if e.is_batch_fatal() => return Err(e),
                Err(e) => {
                    warn!(ref_id = %opt.ref_id, category = e.category(), error = %e, "Query failed");
                    results.push(QueryResult::failed(&opt.ref_id, &e));
                }
            }
        }

        Ok(DatasourceResponse { results })
    }
}
