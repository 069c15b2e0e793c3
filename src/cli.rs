//! Command-line argument parsing.
//!
//! The runner issues one host-style batch and prints the response as JSON.

use crate::config::DatasourceConfig;
use crate::datasource::DatasourceRequest;
use crate::error::{DatasourceError, Result};
use crate::query::TimeRange;
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Runs Athena named queries and prints dashboard-ready results.
/// Executions are cached for this invocation only; repeat --model to share
/// them across queries.
#[derive(Parser, Debug)]
#[command(name = "athena-datasource")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Named query to run (or reuse from cache)
    #[arg(short = 'n', long, value_name = "NAME", conflicts_with_all = ["execution_id", "list", "test"])]
    pub named_query: Option<String>,

    /// Fetch the results of an existing execution
    #[arg(short = 'e', long, value_name = "ID", conflicts_with_all = ["list", "test"])]
    pub execution_id: Option<String>,

    /// List the named queries of the work group
    #[arg(long, conflicts_with = "test")]
    pub list: bool,

    /// Check that the work group is reachable
    #[arg(long)]
    pub test: bool,

    /// Raw query model JSON; may be repeated to send a batch sharing one cache
    #[arg(long, value_name = "JSON", conflicts_with_all = ["named_query", "execution_id", "list", "test"])]
    pub model: Vec<String>,

    /// Work group the query belongs to
    #[arg(short = 'w', long, value_name = "NAME")]
    pub work_group: Option<String>,

    /// AWS region
    #[arg(short = 'r', long, value_name = "REGION")]
    pub region: Option<String>,

    /// Role to assume through STS
    #[arg(long, value_name = "ARN")]
    pub role_arn: Option<String>,

    /// Athena endpoint override (e.g. an emulator)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Result shape: timeseries or table
    #[arg(short = 'f', long, value_name = "FORMAT", default_value = "timeseries")]
    pub format: String,

    /// Column holding timestamps
    #[arg(long, value_name = "COLUMN")]
    pub time_column: Option<String>,

    /// Column holding the metric name
    #[arg(long, value_name = "COLUMN")]
    pub metric_column: Option<String>,

    /// Comma-separated value columns (default: every numeric column)
    #[arg(long, value_name = "COLUMNS")]
    pub value_columns: Option<String>,

    /// Always run the named query instead of reusing a cached execution
    #[arg(long)]
    pub no_cache: bool,

    /// Start of the time range, epoch milliseconds
    #[arg(long, value_name = "MS")]
    pub from: Option<i64>,

    /// End of the time range, epoch milliseconds
    #[arg(long, value_name = "MS")]
    pub to: Option<i64>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Pretty-print the JSON response
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Connection settings given on the command line only.
    pub fn to_datasource_config(&self) -> DatasourceConfig {
        DatasourceConfig {
            region: self.region.clone(),
            work_group: self.work_group.clone(),
            auth_type: self.role_arn.as_ref().map(|_| "RoleArn".to_string()),
            role_arn: self.role_arn.clone(),
            endpoint: self.endpoint.clone(),
            ..DatasourceConfig::default()
        }
    }

    /// Builds the query model from the mode and rendering flags.
    pub fn query_model(&self) -> String {
        let mut model = Map::new();
        let mut put = |key: &str, value: Value| {
            model.insert(key.to_string(), value);
        };

        put("refId", Value::from("A"));
        let mode = if let Some(name) = &self.named_query {
            put("namedQuery", Value::from(name.as_str()));
            "NamedQuery"
        } else if let Some(id) = &self.execution_id {
            put("executionId", Value::from(id.as_str()));
            "ExecutionQuery"
        } else if self.list {
            "GetNamedQueryMetrics"
        } else {
            "ConnectionTest"
        };
        put("queryType", Value::from(mode));
        put("format", Value::from(self.format.as_str()));
        put("useCache", Value::from(!self.no_cache));

        for (key, value) in [
            ("timeColumn", &self.time_column),
            ("metricColumn", &self.metric_column),
            ("valueColumns", &self.value_columns),
        ] {
            if let Some(value) = value {
                put(key, Value::from(value.as_str()));
            }
        }

        Value::Object(model).to_string()
    }

    pub fn time_range(&self) -> Result<TimeRange> {
        let range = TimeRange::from_epoch_millis(
            self.from.unwrap_or(i64::MIN),
            self.to.unwrap_or(i64::MAX),
        );
        if range.from > range.to {
            return Err(DatasourceError::config("--from must not be after --to"));
        }
        Ok(range)
    }

    /// Builds the batch to send, using `settings` as the datasource settings.
    pub fn to_request(&self, settings: &DatasourceConfig) -> Result<DatasourceRequest> {
        let queries = if self.model.is_empty() {
            vec![self.query_model()]
        } else {
            self.model.clone()
        };

        Ok(DatasourceRequest {
            time_range: self.time_range()?,
            datasource_json: settings.to_settings_json(),
            secure_json: settings.secure_json(),
            queries,
        })
    }
}
