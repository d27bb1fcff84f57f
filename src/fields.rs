//! Per-row display mapping.

use std::collections::HashMap;

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

use crate::entity::{value_as_id, ColumnKind, EntitySpec};

/// Placeholder for anything absent or unparsable.
pub const NOT_AVAILABLE: &str = "N/A";

/// Loaded `id -> name` tables, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    tables: HashMap<String, HashMap<i64, String>>,
}

impl Lookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I>(&mut self, entity: &str, entries: I)
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        self.tables
            .insert(entity.to_string(), entries.into_iter().collect());
    }

    pub fn name(&self, entity: &str, id: i64) -> Option<&str> {
        self.tables
            .get(entity)
            .and_then(|table| table.get(&id))
            .map(String::as_str)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.tables.contains_key(entity)
    }
}

/// One display-ready row: the record id plus every declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub id: Option<i64>,
    pub active: bool,
    /// `(column name, text)` in declaration order.
    pub cells: Vec<(String, String)>,
}

impl ViewRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, text)| text.as_str())
    }
}

pub fn map_row(raw: &Value, spec: &EntitySpec, lookups: &Lookups) -> ViewRow {
    let active = is_active(raw, &spec.singular_key);
    let cells = spec
        .columns
        .iter()
        .map(|column| {
            let text = match &column.kind {
                ColumnKind::Text { path } => lookup_path(raw, path)
                    .and_then(display_text)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                ColumnKind::Date { path } => format_date(lookup_path(raw, path)),
                ColumnKind::Active => (if active { "Active" } else { "Inactive" }).to_string(),
                ColumnKind::Lookup {
                    key,
                    lookup,
                    embedded,
                } => resolve_reference(raw, key, lookup, embedded, lookups),
            };
            (column.name.clone(), text)
        })
        .collect();

    ViewRow {
        id: spec.record_id(raw),
        active,
        cells,
    }
}

/// `isActive`, then `active`, then the wrapped record's `isActive`, then an
/// inverted `isDelete`. Absence of all of them means active.
pub fn is_active(raw: &Value, wrapper_key: &str) -> bool {
    let nested = raw.get(wrapper_key).and_then(|inner| inner.get("isActive"));
    let candidates = [raw.get("isActive"), raw.get("active"), nested];
    for value in candidates.into_iter().flatten() {
        if let Some(flag) = coerce_flag(value) {
            return flag;
        }
    }
    raw.get("isDelete")
        .and_then(coerce_flag)
        .map(|deleted| !deleted)
        .unwrap_or(true)
}

/// Boolean-ish coercion. Unknown spellings yield `None`, not `false`.
pub fn coerce_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "active" => Some(true),
            "false" | "no" | "n" | "0" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Formats a timestamp as `YYYY-MM-DD`, or `N/A`.
pub fn format_date(value: Option<&Value>) -> String {
    value
        .and_then(parse_date)
        .and_then(|date| date.format(format_description!("[year]-[month]-[day]")).ok())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn parse_date(value: &Value) -> Option<Date> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .ok()
                .map(OffsetDateTime::date)
        }
        // Jackson without JavaTimeModule config: [2024, 1, 31, 10, 15, 0]
        Value::Array(parts) => {
            let mut nums = parts.iter().map(Value::as_i64);
            let year = i32::try_from(nums.next()??).ok()?;
            let month = Month::try_from(u8::try_from(nums.next()??).ok()?).ok()?;
            let day = u8::try_from(nums.next()??).ok()?;
            Date::from_calendar_date(year, month, day).ok()
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<Date> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt.date());
    }
    let local = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    if let Ok(dt) = PrimitiveDateTime::parse(s, local) {
        return Some(dt.date());
    }
    let spaced = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    if let Ok(dt) = PrimitiveDateTime::parse(s, spaced) {
        return Some(dt.date());
    }
    Date::parse(s, format_description!("[year]-[month]-[day]")).ok()
}

fn resolve_reference(
    raw: &Value,
    key: &str,
    lookup: &str,
    embedded: &[String],
    lookups: &Lookups,
) -> String {
    // the lookup table is fresher than whatever the row embedded
    let from_table = raw
        .get(key)
        .and_then(value_as_id)
        .and_then(|id| lookups.name(lookup, id))
        .map(str::to_string);
    from_table
        .or_else(|| {
            embedded
                .iter()
                .find_map(|path| lookup_path(raw, path).and_then(display_text))
        })
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Walks a dotted path such as `insertedBy.userName`.
pub fn lookup_path<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(raw, |current, segment| current.get(segment))
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entity::EntityRegistry;

    #[test]
    fn absent_activity_flag_means_active() {
        assert!(is_active(&json!({"id": 1}), "state"));
        assert!(is_active(&json!({"isActive": null}), "state"));
        assert!(is_active(&json!({"isActive": "maybe"}), "state"));
    }

    #[test]
    fn activity_flag_priority_order() {
        assert!(!is_active(&json!({"isActive": false, "active": true}), "state"));
        assert!(!is_active(&json!({"active": "N"}), "state"));
        assert!(!is_active(&json!({"state": {"isActive": 0}}), "state"));
        assert!(!is_active(&json!({"isDelete": true}), "state"));
        assert!(is_active(&json!({"isDelete": "false"}), "state"));
    }

    #[test]
    fn dates_in_known_formats() {
        assert_eq!(format_date(Some(&json!("2024-03-09T10:15:30Z"))), "2024-03-09");
        assert_eq!(format_date(Some(&json!("2024-03-09T10:15:30.123456"))), "2024-03-09");
        assert_eq!(format_date(Some(&json!("2024-03-09 10:15:30"))), "2024-03-09");
        assert_eq!(format_date(Some(&json!("2024-03-09"))), "2024-03-09");
        assert_eq!(format_date(Some(&json!(1_709_980_000_000i64))), "2024-03-09");
        assert_eq!(format_date(Some(&json!([2024, 3, 9, 10, 15]))), "2024-03-09");
    }

    #[test]
    fn bad_or_missing_dates_render_placeholder() {
        assert_eq!(format_date(None), NOT_AVAILABLE);
        assert_eq!(format_date(Some(&json!(""))), NOT_AVAILABLE);
        assert_eq!(format_date(Some(&json!("yesterday"))), NOT_AVAILABLE);
        assert_eq!(format_date(Some(&json!([2024, 13, 1]))), NOT_AVAILABLE);
        assert_eq!(format_date(Some(&json!({"date": 1}))), NOT_AVAILABLE);
    }

    #[test]
    fn every_column_is_populated() {
        let registry = EntityRegistry::builtin();
        let spec = registry.get("city").unwrap();
        let row = map_row(&json!({}), spec, &Lookups::new());
        assert_eq!(row.cells.len(), spec.columns.len());
        assert!(row.active);
        assert_eq!(row.id, None);
        for (name, text) in &row.cells {
            if name == "status" {
                assert_eq!(text, "Active");
            } else {
                assert_eq!(text, NOT_AVAILABLE, "column {name}");
            }
        }
    }

    #[test]
    fn lookup_table_wins_over_embedded_name() {
        let registry = EntityRegistry::builtin();
        let spec = registry.get("state").unwrap();
        let raw = json!({
            "stateId": 4,
            "stateName": "Kerala",
            "countryId": 1,
            "countryName": "Old India",
            "insertedBy": {"userId": 2, "userName": "admin"},
        });

        let embedded_only = map_row(&raw, spec, &Lookups::new());
        assert_eq!(embedded_only.get("country"), Some("Old India"));
        assert_eq!(embedded_only.get("insertedBy"), Some("admin"));
        assert_eq!(embedded_only.get("updatedBy"), Some(NOT_AVAILABLE));

        let mut lookups = Lookups::new();
        lookups.insert("country", [(1, "India".to_string())]);
        let row = map_row(&raw, spec, &lookups);
        assert_eq!(row.id, Some(4));
        assert_eq!(row.get("country"), Some("India"));
        assert_eq!(row.get("stateName"), Some("Kerala"));
    }

    #[test]
    fn embedded_paths_reach_nested_objects() {
        let registry = EntityRegistry::builtin();
        let spec = registry.get("topic").unwrap();
        let raw = json!({
            "topicId": 9,
            "topicName": "Ownership",
            "module": {"moduleName": "Memory", "course": {"courseName": "Rust"}},
        });
        let row = map_row(&raw, spec, &Lookups::new());
        assert_eq!(row.get("module"), Some("Memory"));
        assert_eq!(row.get("course"), Some("Rust"));
    }
}
