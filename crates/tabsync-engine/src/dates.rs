//! Year extraction, the header date index, and the temporal filter
//!
//! Detail tables carry no date of their own; each detail row inherits the
//! year of the header row it references. The index from header key to year
//! is built once per run from the header tables present in the working set
//! and is read-only afterward.
//!
//! The filter is deliberately fail-open: an unparsable or missing date never
//! silently drops data, it only skips filtering for that record. Tightening
//! this would change which records sync and is left to product owners.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{RunConfig, TableConfig};
use crate::record::{row_value, FieldValue, RawRow, TableSnapshot};

/// Extract the year from a field value.
///
/// Structured date values yield their year directly. Strings are parsed as
/// ISO `YYYY-MM-DD` (a longer timestamp string is truncated to its date
/// part), then `DD/MM/YYYY`, then a bare leading 4-digit year. Anything
/// else, including empty values, is unknown (`None`).
pub fn extract_year(value: &FieldValue) -> Option<i32> {
    match value {
        FieldValue::Date(d) => Some(d.year()),
        FieldValue::Timestamp(ts) => Some(ts.year()),
        FieldValue::Text(s) => extract_year_str(s),
        _ => None,
    }
}

fn extract_year_str(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let date_part = if s.len() > 10 {
        s.get(..10).unwrap_or(s)
    } else {
        s
    };
    if let Ok(d) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(d.year());
    }
    if let Ok(d) = NaiveDate::parse_from_str(date_part, "%d/%m/%Y") {
        return Some(d.year());
    }

    // Bare year, or a format with a leading year and an unusual separator
    if s.len() >= 4 && s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        if let Ok(year) = s[..4].parse::<i32>() {
            if (1000..=9999).contains(&year) {
                return Some(year);
            }
        }
    }

    None
}

/// Mapping from header-table name to header key to year.
///
/// `None` as a year means the header row's date was missing or unparsable;
/// the temporal filter treats that as do-not-filter.
#[derive(Debug, Default)]
pub struct HeaderDateIndex {
    tables: HashMap<String, HashMap<String, Option<i32>>>,
}

impl HeaderDateIndex {
    /// Build the index for one run.
    ///
    /// Scans every header table that (a) some configured detail table
    /// references and (b) is present in the working set. A header table
    /// absent from the working set is simply not indexed; its dependents
    /// skip the year filter entirely.
    pub fn build(
        config: &RunConfig,
        snapshots: &HashMap<String, TableSnapshot>,
    ) -> Self {
        let mut index = Self::default();

        for table in config.tables.values() {
            let Some(ref header) = table.header_ref else {
                continue;
            };
            if index.tables.contains_key(&header.table) {
                continue;
            }
            let Some(snapshot) = snapshots.get(&header.table) else {
                debug!(
                    header_table = %header.table,
                    "header table not in working set; dependents will not be year-filtered"
                );
                continue;
            };

            let mut keys: HashMap<String, Option<i32>> = HashMap::new();
            for row in &snapshot.rows {
                let Some(key) = row_value(row, &header.key_field)
                    .and_then(FieldValue::canonical_string)
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                else {
                    continue;
                };
                let year = row_value(row, &header.date_field).and_then(extract_year);
                // Source guarantees one row per key; last-write-wins otherwise
                keys.insert(key, year);
            }

            debug!(
                header_table = %header.table,
                entries = keys.len(),
                "header date index built"
            );
            index.tables.insert(header.table.clone(), keys);
        }

        index
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Year for a header key: `None` if the table or key is unindexed,
    /// `Some(None)` if indexed but the year is unknown.
    pub fn year_of(&self, table: &str, key: &str) -> Option<Option<i32>> {
        self.tables.get(table).and_then(|keys| keys.get(key)).copied()
    }
}

/// Decides whether a record belongs to the current processing window.
pub struct TemporalFilter<'a> {
    target_year: i32,
    index: &'a HeaderDateIndex,
}

impl<'a> TemporalFilter<'a> {
    pub fn new(target_year: i32, index: &'a HeaderDateIndex) -> Self {
        Self { target_year, index }
    }

    /// Inclusion policy, in order: own date field, header reference,
    /// no date association. Unknown years always include (fail-open).
    pub fn includes(&self, row: &RawRow, table: &TableConfig) -> bool {
        if let Some(ref date_field) = table.date_field {
            return match row_value(row, date_field).and_then(extract_year) {
                Some(year) => year == self.target_year,
                None => true,
            };
        }

        if let Some(ref header) = table.header_ref {
            if !self.index.has_table(&header.table) {
                return true;
            }
            let Some(key) = row_value(row, &header.key_field)
                .and_then(FieldValue::canonical_string)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
            else {
                warn!(
                    header_table = %header.table,
                    key_field = %header.key_field,
                    "detail row has no foreign key value; including"
                );
                return true;
            };
            return match self.index.year_of(&header.table, &key) {
                Some(Some(year)) => year == self.target_year,
                // Key not found, or header date unknown: include
                _ => true,
            };
        }

        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::HeaderRef;
    use chrono::{TimeZone, Utc};

    fn detail_config() -> TableConfig {
        TableConfig {
            key_field: "NO_FAC".into(),
            date_field: None,
            header_ref: Some(HeaderRef {
                table: "invoices".into(),
                key_field: "NO_FAC".into(),
                date_field: "FALTA_FAC".into(),
            }),
            detail_sequencing: true,
            row_filter: None,
        }
    }

    fn invoices_snapshot(date: &str) -> TableSnapshot {
        TableSnapshot {
            name: "INVOICES.DBF".into(),
            field_names: vec!["NO_FAC".into(), "FALTA_FAC".into()],
            rows: vec![vec![
                ("NO_FAC".into(), FieldValue::Text("F1".into())),
                ("FALTA_FAC".into(), FieldValue::Text(date.into())),
            ]],
        }
    }

    fn index_for(config: &RunConfig, snapshot: TableSnapshot) -> HeaderDateIndex {
        let mut snapshots = HashMap::new();
        snapshots.insert("invoices".to_string(), snapshot);
        HeaderDateIndex::build(config, &snapshots)
    }

    #[test]
    fn test_extract_year_variants() {
        assert_eq!(extract_year(&FieldValue::Text("2025-03-01".into())), Some(2025));
        assert_eq!(extract_year(&FieldValue::Text("01/03/2025".into())), Some(2025));
        assert_eq!(extract_year(&FieldValue::Text("2025".into())), Some(2025));
        assert_eq!(
            extract_year(&FieldValue::Text("2025-03-01T10:30:00Z".into())),
            Some(2025)
        );
        assert_eq!(
            extract_year(&FieldValue::Date(
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
            )),
            Some(2024)
        );
        assert_eq!(
            extract_year(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
            )),
            Some(2023)
        );
    }

    #[test]
    fn test_extract_year_unknown() {
        assert_eq!(extract_year(&FieldValue::Text("".into())), None);
        assert_eq!(extract_year(&FieldValue::Text("   ".into())), None);
        assert_eq!(extract_year(&FieldValue::Text("no date".into())), None);
        assert_eq!(extract_year(&FieldValue::Null), None);
        assert_eq!(extract_year(&FieldValue::Integer(42)), None);
    }

    #[test]
    fn test_index_last_write_wins() {
        let mut config = RunConfig::default();
        config.tables.insert("lineas".into(), detail_config());

        let mut snapshot = invoices_snapshot("2024-01-01");
        snapshot.rows.push(vec![
            ("NO_FAC".into(), FieldValue::Text("F1".into())),
            ("FALTA_FAC".into(), FieldValue::Text("2025-06-15".into())),
        ]);

        let index = index_for(&config, snapshot);
        assert_eq!(index.year_of("invoices", "F1"), Some(Some(2025)));
    }

    #[test]
    fn test_own_date_field_excludes_other_years() {
        let config = TableConfig {
            key_field: "NO_FAC".into(),
            date_field: Some("FECHA".into()),
            header_ref: None,
            detail_sequencing: false,
            row_filter: None,
        };
        let index = HeaderDateIndex::default();
        let filter = TemporalFilter::new(2025, &index);

        let current: RawRow = vec![("FECHA".into(), FieldValue::Text("2025-01-10".into()))];
        let stale: RawRow = vec![("FECHA".into(), FieldValue::Text("2024-01-10".into()))];
        assert!(filter.includes(&current, &config));
        assert!(!filter.includes(&stale, &config));
    }

    #[test]
    fn test_unparsable_date_fails_open() {
        let config = TableConfig {
            key_field: "NO_FAC".into(),
            date_field: Some("FECHA".into()),
            header_ref: None,
            detail_sequencing: false,
            row_filter: None,
        };
        let index = HeaderDateIndex::default();
        let filter = TemporalFilter::new(2025, &index);

        for raw in ["", "  ", "garbage", "99/99"] {
            let row: RawRow = vec![("FECHA".into(), FieldValue::Text(raw.into()))];
            assert!(filter.includes(&row, &config), "value {:?} must include", raw);
        }
    }

    #[test]
    fn test_header_lookup_filters_by_header_year() {
        let mut config = RunConfig::default();
        config.tables.insert("lineas".into(), detail_config());
        let index = index_for(&config, invoices_snapshot("2025-03-01"));

        let row: RawRow = vec![("NO_FAC".into(), FieldValue::Text("F1".into()))];

        let filter = TemporalFilter::new(2025, &index);
        assert!(filter.includes(&row, &config.tables["lineas"]));

        let filter = TemporalFilter::new(2024, &index);
        assert!(!filter.includes(&row, &config.tables["lineas"]));
    }

    #[test]
    fn test_header_key_not_found_fails_open() {
        let mut config = RunConfig::default();
        config.tables.insert("lineas".into(), detail_config());
        let index = index_for(&config, invoices_snapshot("2025-03-01"));
        let filter = TemporalFilter::new(2024, &index);

        let row: RawRow = vec![("NO_FAC".into(), FieldValue::Text("F999".into()))];
        assert!(filter.includes(&row, &config.tables["lineas"]));
    }

    #[test]
    fn test_header_table_absent_skips_filter() {
        let index = HeaderDateIndex::default();
        let filter = TemporalFilter::new(2024, &index);
        let row: RawRow = vec![("NO_FAC".into(), FieldValue::Text("F1".into()))];
        assert!(filter.includes(&row, &detail_config()));
    }

    #[test]
    fn test_no_date_association_always_includes() {
        let index = HeaderDateIndex::default();
        let filter = TemporalFilter::new(2025, &index);
        let row: RawRow = vec![("CODIGO".into(), FieldValue::Text("A1".into()))];
        assert!(filter.includes(&row, &TableConfig::keyed("CODIGO")));
    }
}
