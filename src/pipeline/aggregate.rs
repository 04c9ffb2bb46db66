//! Monthly aggregation of extracted rows.

use crate::error::{SyncError, SyncResult};
use crate::models::{AggregateRow, MonthKey, Row};
use std::collections::BTreeMap;

/// Round to two decimal places.
///
/// Rounds the exact binary value of `value` to the nearest hundredth, ties to
/// even. Decimal literals that look like midpoints are not exact in binary:
/// `15.005` is stored as `15.00500000000000078...` and rounds up to `15.01`,
/// while `2.675` is stored as `2.67499999999999982...` and rounds down to
/// `2.67`.
pub fn round_cents(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Group rows by (year, month) and average `attribute` within each group.
///
/// Rows without a calendar anchor or without the attribute do not contribute,
/// and a month with no contributing rows produces no output. Results are
/// ordered most recent month first.
pub fn aggregate_monthly(rows: &[Row], attribute: &str) -> SyncResult<Vec<AggregateRow>> {
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(SyncError::config("aggregation attribute is not set"));
    }

    let mut groups: BTreeMap<MonthKey, Accumulator> = BTreeMap::new();
    for row in rows {
        let (Some(key), Some(value)) = (row.month_key(), row.value(attribute)) else {
            continue;
        };
        let acc = groups.entry(key).or_default();
        acc.sum += value;
        acc.count += 1;
    }

    Ok(groups
        .into_iter()
        .rev()
        .map(|(key, acc)| AggregateRow {
            key,
            average: round_cents(acc.sum / acc.count as f64),
            samples: acc.count,
        })
        .collect())
}
