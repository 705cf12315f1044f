//! Source rows and record normalization
//!
//! A raw row arrives from the source with heterogeneous native value types.
//! Normalization lowercases every field name and coerces every non-null
//! value to its canonical string representation; nulls pass through. The
//! result is the document shape that gets fingerprinted and persisted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A listed source table, prior to fetching its rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    /// Opaque identifier within the source (file id, path, ...)
    pub id: String,
    /// File name, e.g. "INVOICES.DBF" or "invoices.csv"
    pub name: String,
    /// Last modification time reported by the source
    pub modified_at: DateTime<Utc>,
}

impl TableRef {
    /// Collection name for this table: file extension stripped, lowercased.
    pub fn collection(&self) -> String {
        let base = match self.name.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => self.name.as_str(),
        };
        base.to_lowercase()
    }
}

/// A typed field value as read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Canonical string rendering used by normalization.
    ///
    /// Must be deterministic for identical inputs; fingerprint stability
    /// rests on it. Integral floats render without a trailing ".0" so that
    /// a source flip-flopping between integer and float types for the same
    /// value does not produce spurious rewrites.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Number(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
                    Some(format!("{}", *f as i64))
                } else {
                    Some(f.to_string())
                }
            },
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Timestamp(ts) => Some(ts.to_rfc3339()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// A raw row: ordered field-name/value pairs.
pub type RawRow = Vec<(String, FieldValue)>;

/// A fetched table: name, ordered field list, row sequence.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub name: String,
    pub field_names: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl TableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Look up a field's value in a raw row, matching the name case-insensitively.
pub fn row_value<'a>(row: &'a RawRow, field: &str) -> Option<&'a FieldValue> {
    row.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(field))
        .map(|(_, value)| value)
}

/// Normalize a raw row into its document shape.
///
/// Field names are lowercased; non-null values become their canonical
/// strings; nulls become JSON null. Pure function: the same raw row always
/// produces the same map.
pub fn normalize_row(row: &RawRow) -> Map<String, Value> {
    let mut doc = Map::new();
    for (name, value) in row {
        let json = match value.canonical_string() {
            Some(s) => Value::String(s),
            None => Value::Null,
        };
        doc.insert(name.to_lowercase(), json);
    }
    doc
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tabsync_common::fingerprint::fingerprint_map;

    #[test]
    fn test_collection_name_strips_extension_and_lowercases() {
        let table = TableRef {
            id: "x".into(),
            name: "INVOICES.DBF".into(),
            modified_at: Utc::now(),
        };
        assert_eq!(table.collection(), "invoices");
    }

    #[test]
    fn test_collection_name_without_extension() {
        let table = TableRef {
            id: "x".into(),
            name: "Clientes".into(),
            modified_at: Utc::now(),
        };
        assert_eq!(table.collection(), "clientes");
    }

    #[test]
    fn test_normalize_lowercases_and_stringifies() {
        let row: RawRow = vec![
            ("NO_FAC".into(), FieldValue::Text("F1".into())),
            ("MONTO".into(), FieldValue::Number(100.5)),
            ("CANT".into(), FieldValue::Integer(3)),
            ("OBS".into(), FieldValue::Null),
        ];
        let doc = normalize_row(&row);
        assert_eq!(doc["no_fac"], Value::String("F1".into()));
        assert_eq!(doc["monto"], Value::String("100.5".into()));
        assert_eq!(doc["cant"], Value::String("3".into()));
        assert_eq!(doc["obs"], Value::Null);
    }

    #[test]
    fn test_integral_float_renders_like_integer() {
        assert_eq!(
            FieldValue::Number(3.0).canonical_string(),
            FieldValue::Integer(3).canonical_string()
        );
    }

    #[test]
    fn test_date_renders_iso() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            FieldValue::Date(d).canonical_string().unwrap(),
            "2025-03-01"
        );
    }

    #[test]
    fn test_normalization_is_deterministic_under_field_order() {
        let a: RawRow = vec![
            ("B".into(), FieldValue::Text("2".into())),
            ("A".into(), FieldValue::Text("1".into())),
        ];
        let b: RawRow = vec![
            ("A".into(), FieldValue::Text("1".into())),
            ("B".into(), FieldValue::Text("2".into())),
        ];
        assert_eq!(
            fingerprint_map(&normalize_row(&a)),
            fingerprint_map(&normalize_row(&b))
        );
    }

    #[test]
    fn test_row_value_is_case_insensitive() {
        let row: RawRow = vec![("NO_FAC".into(), FieldValue::Text("F1".into()))];
        assert_eq!(
            row_value(&row, "no_fac"),
            Some(&FieldValue::Text("F1".into()))
        );
        assert!(row_value(&row, "missing").is_none());
    }
}
