//! Normalized result → typed table.

use super::parse_timestamp_millis;
use super::types::{ColumnKind, NormalizedResult, RowValue, Table, TableColumn, TableRow};

/// Converts every row into typed cells, keeping column and row order.
pub fn to_table(result: &NormalizedResult) -> Table {
    let columns = result
        .columns
        .iter()
        .map(|c| TableColumn {
            name: c.name.clone(),
        })
        .collect();

    let rows = result
        .rows
        .iter()
        .map(|row| TableRow {
            values: result
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| coerce_cell(column.kind, cell))
                .collect(),
        })
        .collect();

    Table { columns, rows }
}

/// Coerces one cell to `kind`. Unparseable numbers degrade to zero; Int64
/// cells holding a timestamp become epoch milliseconds.
pub fn coerce_cell(kind: ColumnKind, cell: &str) -> RowValue {
    let mut value = RowValue {
        kind,
        int64_value: 0,
        double_value: 0.0,
        string_value: cell.to_string(),
    };
    match kind {
        ColumnKind::Int64 => {
            value.int64_value = parse_timestamp_millis(cell)
                .or_else(|| cell.trim().parse().ok())
                .unwrap_or(0);
        }
        ColumnKind::Double => value.double_value = cell.trim().parse().unwrap_or(0.0),
        ColumnKind::String => {}
    }
    value
}
