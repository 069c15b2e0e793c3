//! Domain types exchanged with the Athena service.
//!
//! These are the decoded shapes the rest of the crate works with; the wire
//! envelopes live next to the HTTP client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state reported by the service for one query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Returns true once the execution can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns the state as reported by the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored query definition as returned by `BatchGetNamedQuery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamedQuery {
    /// Stable identifier; used as the cache key.
    pub named_query_id: String,

    /// Human name, unique only by convention within a work group.
    pub name: String,

    /// SQL text executed on submission.
    pub query_string: String,

    /// Work group the definition belongs to.
    pub work_group: String,

    /// Catalog database the query runs against.
    #[serde(default)]
    pub database: Option<String>,
}

impl NamedQuery {
    /// Creates a definition with no database.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        query_string: impl Into<String>,
        work_group: impl Into<String>,
    ) -> Self {
        Self {
            named_query_id: id.into(),
            name: name.into(),
            query_string: query_string.into(),
            work_group: work_group.into(),
            database: None,
        }
    }
}

/// The subset of a work group's configuration the engine needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkGroup {
    pub name: String,

    /// S3 location query results are written to.
    pub output_location: Option<String>,
}

/// Everything needed to start one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartExecution {
    pub query_string: String,
    pub work_group: String,
    pub output_location: String,
    pub database: Option<String>,
}

/// One page of named-query identifiers.
#[derive(Debug, Clone, Default)]
pub struct NamedQueryPage {
    pub ids: Vec<String>,
    pub next_token: Option<String>,
}

/// Column metadata as declared by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,

    /// Native type name, e.g. `varchar` or `bigint`.
    pub type_name: String,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A raw tabular payload. On the first page, row 0 repeats the column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawResultSet {
    /// Builds a payload from string cells, prepending the header row.
    pub fn with_header(columns: Vec<RawColumn>, rows: Vec<Vec<&str>>) -> Self {
        let header = columns.iter().map(|c| Some(c.name.clone())).collect();
        let mut all_rows = vec![header];
        all_rows.extend(
            rows.into_iter()
                .map(|row| row.into_iter().map(|cell| Some(cell.to_string())).collect()),
        );
        Self {
            columns,
            rows: all_rows,
        }
    }
}

/// One page of a result payload.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    pub result_set: RawResultSet,
    pub next_token: Option<String>,
}
