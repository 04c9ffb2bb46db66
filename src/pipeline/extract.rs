//! Row extraction from raw records, driven by the inferred schema.

use crate::error::{SyncError, SyncResult};
use crate::models::{PropertyKind, PropertyValue, RawRecord, Row};
use crate::pipeline::schema::InferredFields;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

/// Date-time layouts accepted besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts; these anchor at midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"];

/// Parse an ISO-8601-like date string.
///
/// Offsets are kept as written: `2025-01-31T23:30:00-05:00` belongs to
/// January 31st, not to the UTC instant it denotes.
pub fn parse_timestamp(property: &str, value: &str) -> SyncResult<NaiveDateTime> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if format.ends_with("%z") {
            if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
                return Ok(dt.naive_local());
            }
        } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }

    Err(SyncError::Parse {
        property: property.to_string(),
        value: value.to_string(),
        reason: "unrecognised date format".to_string(),
    })
}

/// Numeric content of a property, read according to its declared kind.
fn numeric_value(kind: &PropertyKind, value: Option<&PropertyValue>) -> Option<f64> {
    match (kind, value?) {
        (PropertyKind::Formula, PropertyValue::Formula(number)) => *number,
        (PropertyKind::Number, PropertyValue::Number(number)) => *number,
        _ => None,
    }
}

/// Convert one record into a row.
///
/// Returns `Ok(None)` when the record carries none of the selected fields,
/// and the parse failure when a present date cannot be read.
pub fn extract_row(record: &RawRecord, fields: &InferredFields) -> SyncResult<Option<Row>> {
    let mut row = Row::default();

    for name in &fields.temporal {
        if let Some(start) = record.property(name).and_then(PropertyValue::as_date_str) {
            row.set_date(parse_timestamp(name, start)?);
        }
    }

    for field in &fields.numeric {
        if let Some(number) = numeric_value(&field.kind, record.property(&field.name)) {
            row.values.insert(field.name.clone(), number);
        }
    }

    Ok(if row.is_empty() { None } else { Some(row) })
}

/// Rows extracted from a record set, with the records that were dropped.
#[derive(Debug, Default)]
pub struct Extraction {
    pub rows: Vec<Row>,
    /// Records without any selected field.
    pub empty: usize,
    /// Record ids dropped because a date failed to parse.
    pub rejected: Vec<String>,
}

/// Extract rows from every record.
///
/// In strict mode the first unparseable date aborts extraction; otherwise the
/// offending record is dropped with a warning.
pub fn extract_rows(
    records: &[RawRecord],
    fields: &InferredFields,
    strict_dates: bool,
) -> SyncResult<Extraction> {
    let mut extraction = Extraction::default();

    for record in records {
        match extract_row(record, fields) {
            Ok(Some(row)) => extraction.rows.push(row),
            Ok(None) => extraction.empty += 1,
            Err(e) if e.is_record_local() && !strict_dates => {
                warn!("Dropping record {}: {}", record.id, e);
                extraction.rejected.push(record.id.clone());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(extraction)
}
