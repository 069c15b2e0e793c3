//! Result shapes produced for the dashboard host.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::query::QueryOption;

/// Semantic type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    String,
    Int64,
    Double,
}

impl ColumnKind {
    /// Numeric code of the kind in the host's row-value model.
    pub fn wire_code(&self) -> i32 {
        match self {
            Self::Double => 1,
            Self::Int64 => 2,
            Self::String => 4,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Double)
    }
}

impl Serialize for ColumnKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.wire_code())
    }
}

/// Native column types reported by Athena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AthenaColumnType {
    Varchar,
    Char,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Date,
    Timestamp,
    /// Any type without a dedicated mapping (arrays, maps, rows, ...).
    Other,
}

impl AthenaColumnType {
    /// Parses a native type name; parameters such as `decimal(10,2)` are ignored.
    pub fn from_type_name(name: &str) -> Self {
        let base = name.split('(').next().unwrap_or_default().trim();
        match base.to_ascii_lowercase().as_str() {
            "varchar" | "string" => Self::Varchar,
            "char" => Self::Char,
            "boolean" => Self::Boolean,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "integer" | "int" => Self::Integer,
            "bigint" => Self::BigInt,
            "real" | "float" => Self::Real,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            _ => Self::Other,
        }
    }

    /// The semantic kind results of this type are coerced to.
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt | Self::Timestamp => {
                ColumnKind::Int64
            }
            Self::Real | Self::Double | Self::Decimal => ColumnKind::Double,
            Self::Varchar | Self::Char | Self::Boolean | Self::Date | Self::Other => {
                ColumnKind::String
            }
        }
    }
}

/// Metadata about one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    #[serde(rename = "colName")]
    pub name: String,

    #[serde(rename = "colType")]
    pub kind: ColumnKind,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Header-stripped, schema-typed rows shared by both transformers.
///
/// `columns[i]` describes cell `i` of every row.
#[derive(Debug, Clone, Default)]
pub struct NormalizedResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<String>>,
    pub option: QueryOption,
}

impl NormalizedResult {
    /// Creates a result with no columns and no rows.
    pub fn empty(option: QueryOption) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            option,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub value: f64,
}

/// A named series with its tags and points sorted by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub points: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
}

/// A typed cell. Only the numeric field matching `kind` is meaningful;
/// `string_value` always holds the original text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowValue {
    pub kind: ColumnKind,
    pub int64_value: i64,
    pub double_value: f64,
    pub string_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub values: Vec<RowValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}
