//! Data models for the rollup pipeline.
//!
//! This module contains the record-store shapes (schemas, raw records,
//! child blocks) and the in-memory shapes the pipeline derives from them
//! (rows, month keys, aggregates).

use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a collection property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    RichText,
    Date,
    Number,
    /// A computed property; numeric results live under `formula.number`.
    Formula,
    /// Any type the pipeline does not read.
    Other(String),
}

impl PropertyKind {
    /// Map a Notion type tag onto a property kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "title" => PropertyKind::Title,
            "rich_text" => PropertyKind::RichText,
            "date" => PropertyKind::Date,
            "number" => PropertyKind::Number,
            "formula" => PropertyKind::Formula,
            other => PropertyKind::Other(other.to_string()),
        }
    }

    /// The Notion type tag for this kind.
    pub fn tag(&self) -> &str {
        match self {
            PropertyKind::Title => "title",
            PropertyKind::RichText => "rich_text",
            PropertyKind::Date => "date",
            PropertyKind::Number => "number",
            PropertyKind::Formula => "formula",
            PropertyKind::Other(tag) => tag,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, PropertyKind::Number | PropertyKind::Formula)
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Declared properties of a collection, ordered by property name.
pub type FieldSchema = BTreeMap<String, PropertyKind>;

/// A typed property value as read from (or written to) the record store.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Plain text of all title fragments, concatenated.
    Title(String),
    RichText(String),
    /// The `start` of a date value, unparsed.
    Date(Option<String>),
    Number(Option<f64>),
    /// The numeric result of a formula; `None` for non-numeric formulas.
    Formula(Option<f64>),
    Other(String),
}

impl PropertyValue {
    /// Numeric content of a `number` or `formula` value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(value) | PropertyValue::Formula(value) => *value,
            _ => None,
        }
    }

    /// Non-empty date start string.
    pub fn as_date_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Date(Some(start)) if !start.trim().is_empty() => Some(start),
            _ => None,
        }
    }
}

/// A record owned by the remote store. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// An immediate child block of a container page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildBlock {
    pub id: String,
    /// Block type tag, e.g. `child_database` or `paragraph`.
    pub block_type: String,
    /// Collection title; only present for child collections.
    pub title: Option<String>,
}

impl ChildBlock {
    pub fn is_collection(&self) -> bool {
        self.block_type == "child_database"
    }
}

/// One page of a collection query.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub records: Vec<RawRecord>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// A single edit to a collection schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchemaChange {
    /// Add a property that does not exist yet.
    Add { name: String, kind: PropertyKind },
    /// Change the type of an existing property.
    Retype { name: String, kind: PropertyKind },
    /// Rename an existing property, keeping its type and values.
    Rename { from: String, to: String },
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::Add { name, kind } => write!(f, "add '{}' ({})", name, kind),
            SchemaChange::Retype { name, kind } => write!(f, "retype '{}' to {}", name, kind),
            SchemaChange::Rename { from, to } => write!(f, "rename '{}' to '{}'", from, to),
        }
    }
}

/// Full English name of a weekday.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Month of a calendar date.
pub fn month_of(date: &NaiveDate) -> Month {
    // `month()` is always within 1..=12.
    Month::try_from(date.month() as u8).unwrap_or(Month::January)
}

/// A flat row extracted from one raw record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// The parsed temporal anchor.
    pub date: Option<NaiveDateTime>,
    pub year: Option<i32>,
    pub month: Option<Month>,
    pub day: Option<Weekday>,
    /// Numeric attributes keyed by their source property name.
    pub values: BTreeMap<String, f64>,
}

impl Row {
    /// Seed the calendar fields from a timestamp, replacing earlier ones.
    pub fn set_date(&mut self, timestamp: NaiveDateTime) {
        let date = timestamp.date();
        self.date = Some(timestamp);
        self.year = Some(date.year());
        self.month = Some(month_of(&date));
        self.day = Some(date.weekday());
    }

    pub fn month_key(&self) -> Option<MonthKey> {
        Some(MonthKey::new(self.year?, self.month?))
    }

    pub fn value(&self, attribute: &str) -> Option<f64> {
        self.values.get(attribute).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.values.is_empty()
    }
}

/// A (year, month) grouping key. Renders as `"<Month> <Year>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: Month,
}

impl MonthKey {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    /// Natural key used to match summary records, e.g. `"June 2025"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.month.name(), self.year)
    }

    /// Calendar ordinal of the month (January = 1).
    pub fn ordinal(&self) -> u32 {
        self.month.number_from_month()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.ordinal(), 1)
    }

    /// First day of the month as `YYYY-MM-01`.
    pub fn first_day_string(&self) -> String {
        format!("{:04}-{:02}-01", self.year, self.ordinal())
    }
}

impl Ord for MonthKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.ordinal()).cmp(&(other.year, other.ordinal()))
    }
}

impl PartialOrd for MonthKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.month.name(), self.year)
    }
}

/// The mean of the aggregation attribute for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub key: MonthKey,
    /// Mean rounded to two decimal places.
    pub average: f64,
    /// Number of rows that carried the attribute.
    pub samples: usize,
}

/// The properties written for one month in the summary collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub label: String,
    pub average: f64,
    pub date: String,
}

impl From<&AggregateRow> for SummaryRecord {
    fn from(row: &AggregateRow) -> Self {
        Self {
            label: row.key.label(),
            average: row.average,
            date: row.key.first_day_string(),
        }
    }
}
