//! Result transformation.
//!
//! A raw payload is first normalized (header dropped, columns typed) and
//! then rendered either as time series or as a typed table.

mod parser;
mod series;
mod table;
mod types;

use chrono::NaiveDateTime;
use serde::Serialize;

pub use parser::parse_result_set;
pub use series::to_time_series;
pub use table::{coerce_cell, to_table};
pub use types::{
    AthenaColumnType, ColumnInfo, ColumnKind, NormalizedResult, RowValue, Table, TableColumn,
    TableRow, TimeSeries, TimeSeriesPoint,
};

/// Text layout of timestamps in result cells (UTC).
pub const TIMESTAMP_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_LAYOUT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parses a result timestamp into epoch milliseconds.
pub fn parse_timestamp_millis(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    NaiveDateTime::parse_from_str(cell, TIMESTAMP_LAYOUT)
        .or_else(|_| NaiveDateTime::parse_from_str(cell, TIMESTAMP_LAYOUT_FRACTIONAL))
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Column metadata attached to every query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResultMetadata {
    #[serde(rename = "colInfos")]
    pub col_infos: Vec<ColumnInfo>,
}

impl QueryResultMetadata {
    pub fn from_result(result: &NormalizedResult) -> Self {
        Self {
            col_infos: result.columns.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"colInfos":[]}"#.to_string())
    }
}
