//! Schema inference: which properties are temporal and which are numeric.

use crate::models::{FieldSchema, PropertyKind};
use tracing::warn;

/// A numeric property and how its value is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericField {
    pub name: String,
    /// `Formula` fields read `formula.number`; `Number` fields read `number`.
    pub kind: PropertyKind,
}

/// Properties selected for extraction, in ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredFields {
    pub temporal: Vec<String>,
    pub numeric: Vec<NumericField>,
}

impl InferredFields {
    pub fn is_empty(&self) -> bool {
        self.temporal.is_empty() && self.numeric.is_empty()
    }

    pub fn has_numeric(&self, name: &str) -> bool {
        self.numeric.iter().any(|f| f.name == name)
    }
}

/// Partition a collection schema into temporal and numeric fields.
///
/// With `date_property` set, that property is the only temporal anchor (if it
/// is declared as a date). Otherwise every `date` property is used, in name
/// order, and later ones overwrite the calendar fields derived from earlier
/// ones.
pub fn infer_fields(schema: &FieldSchema, date_property: Option<&str>) -> InferredFields {
    let mut fields = InferredFields::default();

    for (name, kind) in schema {
        match kind {
            PropertyKind::Date => {
                if date_property.map_or(true, |anchor| anchor == name) {
                    fields.temporal.push(name.clone());
                }
            }
            kind if kind.is_numeric() => fields.numeric.push(NumericField {
                name: name.clone(),
                kind: kind.clone(),
            }),
            _ => {}
        }
    }

    if let Some(anchor) = date_property {
        if fields.temporal.is_empty() {
            warn!(
                "Date property '{}' is not declared as a date in the source schema",
                anchor
            );
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_schema() -> FieldSchema {
        let mut schema = FieldSchema::new();
        schema.insert("Name".to_string(), PropertyKind::Title);
        schema.insert("Date".to_string(), PropertyKind::Date);
        schema.insert("Logged".to_string(), PropertyKind::Date);
        schema.insert("rnd".to_string(), PropertyKind::Formula);
        schema.insert("Minutes".to_string(), PropertyKind::Number);
        schema.insert("Tags".to_string(), PropertyKind::Other("multi_select".to_string()));
        schema
    }

    #[test]
    fn test_partition_all_dates() {
        let fields = infer_fields(&daily_schema(), None);

        assert_eq!(fields.temporal, vec!["Date", "Logged"]);
        assert_eq!(
            fields.numeric,
            vec![
                NumericField {
                    name: "Minutes".to_string(),
                    kind: PropertyKind::Number
                },
                NumericField {
                    name: "rnd".to_string(),
                    kind: PropertyKind::Formula
                },
            ]
        );
        assert!(fields.has_numeric("rnd"));
        assert!(!fields.has_numeric("Tags"));
    }

    #[test]
    fn test_designated_date_property() {
        let fields = infer_fields(&daily_schema(), Some("Date"));
        assert_eq!(fields.temporal, vec!["Date"]);
    }

    #[test]
    fn test_designated_property_not_a_date() {
        let fields = infer_fields(&daily_schema(), Some("Minutes"));
        assert!(fields.temporal.is_empty());
        assert_eq!(fields.numeric.len(), 2);
    }

    #[test]
    fn test_no_matching_fields() {
        let mut schema = FieldSchema::new();
        schema.insert("Name".to_string(), PropertyKind::Title);

        let fields = infer_fields(&schema, None);
        assert!(fields.is_empty());
    }
}
