//! Raw payload → normalized result.

use super::types::{AthenaColumnType, ColumnInfo, NormalizedResult};
use crate::athena::RawResultSet;
use crate::query::QueryOption;

/// Converts a raw payload into a normalized result for `option`.
///
/// Row 0 is the header and is discarded; with fewer than two rows there is
/// no data. Missing cells and nulls become empty strings, so every row has
/// exactly one cell per column.
pub fn parse_result_set(option: &QueryOption, raw: RawResultSet) -> NormalizedResult {
    let columns: Vec<ColumnInfo> = raw
        .columns
        .iter()
        .map(|c| ColumnInfo::new(&c.name, AthenaColumnType::from_type_name(&c.type_name).kind()))
        .collect();

    let rows = if raw.rows.len() > 1 {
        raw.rows
            .into_iter()
            .skip(1)
            .map(|row| {
                let mut cells: Vec<String> =
                    row.into_iter().map(Option::unwrap_or_default).collect();
                cells.resize(columns.len(), String::new());
                cells
            })
            .collect()
    } else {
        Vec::new()
    };

    NormalizedResult {
        columns,
        rows,
        option: option.clone(),
    }
}
