//! Normalized result → time series.

use std::collections::BTreeMap;

use tracing::debug;

use super::parse_timestamp_millis;
use super::types::{NormalizedResult, TimeSeries, TimeSeriesPoint};

/// Groups rows into series keyed by metric and value column.
///
/// The time column supplies timestamps and the metric column the series
/// prefix. Other non-numeric columns become tags; numeric columns become
/// values when allowlisted (or when the allowlist is empty). Rows outside
/// the option's time range are dropped, rows without a timestamp are kept.
/// Series are returned ordered by name, each with points sorted by time.
pub fn to_time_series(result: &NormalizedResult) -> Vec<TimeSeries> {
    let opt = &result.option;
    let allowlist = opt.value_column_allowlist();
    let mut series: BTreeMap<String, TimeSeries> = BTreeMap::new();

    for row in &result.rows {
        let mut timestamp = None;
        let mut metric = "";
        let mut tags = BTreeMap::new();
        let mut values = Vec::new();

        for (column, cell) in result.columns.iter().zip(row) {
            if column.name == opt.time_column {
                timestamp = parse_timestamp_millis(cell);
                if timestamp.is_none() {
                    debug!(column = %column.name, value = %cell, "Unparseable timestamp");
                }
            } else if column.name == opt.metric_column {
                metric = cell.as_str();
            } else if !column.kind.is_numeric() {
                tags.insert(column.name.clone(), cell.clone());
            } else if allowlist.is_empty() || allowlist.contains(&column.name) {
                values.push((column.name.as_str(), cell.parse::<f64>().unwrap_or(0.0)));
            }
        }

        if timestamp.is_some_and(|ts| !opt.time_range.contains_millis(ts)) {
            continue;
        }
        let timestamp = timestamp.unwrap_or(0);

        for (column_name, value) in values {
            let name = series_name(metric, column_name);
            let entry = series
                .entry(name)
                .or_insert_with_key(|name| TimeSeries::new(name.clone()));
            entry.tags = tags.clone();
            entry.points.push(TimeSeriesPoint { timestamp, value });
        }
    }

    series
        .into_values()
        .map(|mut s| {
            s.points.sort_by_key(|p| p.timestamp);
            s
        })
        .collect()
}

fn series_name(metric: &str, value_column: &str) -> String {
    if metric.is_empty() {
        value_column.to_string()
    } else {
        format!("{metric} {value_column}")
    }
}
