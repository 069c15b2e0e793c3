//! Per-query options.
//!
//! A `QueryOption` is assembled once per query from the datasource settings,
//! the query model and the request time range, and is read-only afterwards.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Which operation the dispatcher performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum QueryMode {
    /// Resolve a named query, executing it unless a cached run can be reused.
    #[serde(rename = "NamedQuery")]
    Named,
    /// Fetch the results of a known execution.
    #[serde(rename = "ExecutionQuery")]
    Execution,
    /// List named queries for selection widgets.
    #[serde(rename = "GetNamedQueryMetrics")]
    Metrics,
    /// Check that the work group is reachable.
    #[default]
    #[serde(other)]
    ConnectionTest,
}

/// How results are shaped for the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum OutputFormat {
    TimeSeries,
    Table,
    /// Anything else; rejected when the result is rendered.
    Other(String),
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::TimeSeries
    }
}

impl From<String> for OutputFormat {
    fn from(s: String) -> Self {
        match s.as_str() {
            "timeseries" => Self::TimeSeries,
            "table" => Self::Table,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeSeries => f.write_str("timeseries"),
            Self::Table => f.write_str("table"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Credential source for a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AuthType {
    /// Access key pair from the datasource settings.
    Static,
    /// Delegated role assumed through STS.
    RoleArn,
    /// Ambient environment credentials.
    #[default]
    #[serde(other)]
    Default,
}

/// Region and credential settings shared by every query of a datasource.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub region: String,
    pub auth_type: AuthType,
    pub access_key: String,

    /// Comes from the decrypted secure settings, never from plain JSON.
    #[serde(skip)]
    pub secret_key: String,

    pub role_arn: String,

    /// Overrides the regional Athena endpoint.
    pub endpoint: Option<String>,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("region", &self.region)
            .field("auth_type", &self.auth_type)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("role_arn", &self.role_arn)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Inclusive time window of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            from: DateTime::<Utc>::MIN_UTC,
            to: DateTime::<Utc>::MAX_UTC,
        }
    }
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Builds a range from epoch milliseconds, as sent by the host.
    pub fn from_epoch_millis(from_ms: i64, to_ms: i64) -> Self {
        let from = Utc
            .timestamp_millis_opt(from_ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let to = Utc
            .timestamp_millis_opt(to_ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { from, to }
    }

    /// Returns true if the epoch-millis timestamp lies within the range.
    pub fn contains_millis(&self, ts_ms: i64) -> bool {
        ts_ms >= self.from.timestamp_millis() && ts_ms <= self.to.timestamp_millis()
    }
}

/// Everything needed to run and render one query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOption {
    /// Host-assigned identifier echoed back in the result.
    pub ref_id: String,

    #[serde(rename = "queryType")]
    pub mode: QueryMode,

    pub work_group: String,
    pub named_query: String,
    pub execution_id: String,
    pub time_column: String,
    pub metric_column: String,

    /// Comma-separated allowlist of value columns; empty allows all numeric columns.
    pub value_columns: String,

    pub use_cache: bool,
    pub format: OutputFormat,

    #[serde(flatten)]
    pub connection: ConnectionSettings,

    #[serde(skip)]
    pub time_range: TimeRange,
}

impl Default for QueryOption {
    fn default() -> Self {
        Self {
            ref_id: String::new(),
            mode: QueryMode::default(),
            work_group: String::new(),
            named_query: String::new(),
            execution_id: String::new(),
            time_column: "time".to_string(),
            metric_column: "metric".to_string(),
            value_columns: String::new(),
            use_cache: true,
            format: OutputFormat::default(),
            connection: ConnectionSettings::default(),
            time_range: TimeRange::default(),
        }
    }
}

impl QueryOption {
    /// Creates a named-query option.
    pub fn named(name: impl Into<String>, work_group: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::Named,
            named_query: name.into(),
            work_group: work_group.into(),
            ..Self::default()
        }
    }

    /// Creates an execution-handle option.
    pub fn execution(handle: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::Execution,
            execution_id: handle.into(),
            ..Self::default()
        }
    }

    /// Named mode needs both the query name and its work group.
    pub fn is_valid_named_query(&self) -> bool {
        !self.named_query.is_empty() && !self.work_group.is_empty()
    }

    pub fn is_valid_execution_query(&self) -> bool {
        !self.execution_id.is_empty()
    }

    /// Parses the value-column allowlist.
    pub fn value_column_allowlist(&self) -> HashSet<String> {
        self.value_columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }
}
