//! Response envelope probing.
//!
//! The backend wraps pages of records in several different shapes. Each
//! known shape is a variant of [`EnvelopeShape`]; [`normalize`] tries them in
//! a fixed order and always produces a [`Page`], degrading to an empty one
//! when nothing matches.

use serde_json::{Map, Value};

use crate::entity::value_as_id;

const COUNT_FIELDS: [&str; 2] = ["totalElements", "totalCount"];

/// Which envelope variant a payload matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// The payload itself is an array of records.
    BareArray,
    /// `{ data: [...] }`
    DataArray,
    /// Spring-style page: `{ data: { content: [...], totalElements } }`.
    SpringPage,
    /// Entity-named plural field, e.g. `{ data: { states: [...] } }`.
    PluralField(String),
    /// `{ data: [ { courses: [...] } ] }`
    DoubleWrapped(String),
    Unrecognized,
}

/// A normalized page of raw records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Value>,
    pub total: u64,
    /// False when `total` fell back to the row count.
    pub explicit_total: bool,
    pub shape: EnvelopeShape,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            explicit_total: false,
            shape: EnvelopeShape::Unrecognized,
        }
    }
}

struct Matched<'a> {
    shape: EnvelopeShape,
    rows: &'a [Value],
    /// Objects searched for a count, innermost first.
    holders: Vec<&'a Map<String, Value>>,
}

/// Resolves `raw` to rows and a total. Never fails.
pub fn normalize(raw: &Value, plural_keys: &[String]) -> Page {
    let Some(matched) = classify(raw, plural_keys) else {
        tracing::warn!(
            kind = json_kind(raw),
            "unrecognized response envelope; rendering an empty page"
        );
        return Page::empty();
    };

    let explicit = matched
        .holders
        .iter()
        .find_map(|holder| explicit_count(holder));

    tracing::debug!(shape = ?matched.shape, rows = matched.rows.len(), "normalized envelope");

    Page {
        rows: matched.rows.to_vec(),
        total: explicit.unwrap_or(matched.rows.len() as u64),
        explicit_total: explicit.is_some(),
        shape: matched.shape,
    }
}

/// Only the shape, for diagnostics.
pub fn shape_of(raw: &Value, plural_keys: &[String]) -> EnvelopeShape {
    classify(raw, plural_keys)
        .map(|m| m.shape)
        .unwrap_or(EnvelopeShape::Unrecognized)
}

fn classify<'a>(raw: &'a Value, plural_keys: &[String]) -> Option<Matched<'a>> {
    let top = raw.as_object();
    let data = top.and_then(|obj| obj.get("data"));

    // Rule 1, except when the array is really a wrapper around the plural field.
    if let Value::Array(rows) = raw {
        if let Some(found) = double_wrapped(rows, plural_keys, Vec::new()) {
            return Some(found);
        }
        return Some(Matched {
            shape: EnvelopeShape::BareArray,
            rows,
            holders: Vec::new(),
        });
    }
    let top = top?;
    if let Some(Value::Array(rows)) = data {
        if let Some(found) = double_wrapped(rows, plural_keys, vec![top]) {
            return Some(found);
        }
        return Some(Matched {
            shape: EnvelopeShape::DataArray,
            rows,
            holders: vec![top],
        });
    }

    // Rule 2
    let data_obj = data.and_then(Value::as_object);
    if let Some(page) = data_obj {
        if let Some(Value::Array(rows)) = page.get("content") {
            return Some(Matched {
                shape: EnvelopeShape::SpringPage,
                rows,
                holders: vec![page, top],
            });
        }
    }
    if let Some(Value::Array(rows)) = top.get("content") {
        return Some(Matched {
            shape: EnvelopeShape::SpringPage,
            rows,
            holders: vec![top],
        });
    }

    // Rule 3
    if let Some(inner) = data_obj {
        if let Some((key, rows)) = plural_field(inner, plural_keys) {
            return Some(Matched {
                shape: EnvelopeShape::PluralField(key.to_string()),
                rows,
                holders: vec![inner, top],
            });
        }
    }
    if let Some((key, rows)) = plural_field(top, plural_keys) {
        return Some(Matched {
            shape: EnvelopeShape::PluralField(key.to_string()),
            rows,
            holders: vec![top],
        });
    }

    None
}

/// Rule 4: the first array element is a wrapper carrying the plural field.
/// An element with its own identifier is a record with a nested list, not a
/// wrapper.
fn double_wrapped<'a>(
    rows: &'a [Value],
    plural_keys: &[String],
    outer: Vec<&'a Map<String, Value>>,
) -> Option<Matched<'a>> {
    let wrapper = rows.first()?.as_object()?;
    if looks_like_record(wrapper) {
        return None;
    }
    let (key, inner_rows) = plural_field(wrapper, plural_keys)?;
    let mut holders = vec![wrapper];
    holders.extend(outer);
    Some(Matched {
        shape: EnvelopeShape::DoubleWrapped(key.to_string()),
        rows: inner_rows,
        holders,
    })
}

fn looks_like_record(obj: &Map<String, Value>) -> bool {
    obj.iter()
        .any(|(key, value)| (key == "id" || key.ends_with("Id")) && value_as_id(value).is_some())
}

fn plural_field<'a, 'k>(
    obj: &'a Map<String, Value>,
    plural_keys: &'k [String],
) -> Option<(&'k str, &'a [Value])> {
    plural_keys.iter().find_map(|key| match obj.get(key) {
        Some(Value::Array(rows)) => Some((key.as_str(), rows.as_slice())),
        _ => None,
    })
}

fn explicit_count(obj: &Map<String, Value>) -> Option<u64> {
    COUNT_FIELDS
        .iter()
        .find_map(|field| obj.get(*field).and_then(count_value))
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The `{ code, status, message, error, data }` triple wrapped around
/// mutation and fetch-by-id responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiReply {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub data: Option<Value>,
}

impl ApiReply {
    pub fn from_value(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self {
                data: Some(raw.clone()),
                ..Self::default()
            };
        };
        Self {
            code: obj.get("code").and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }),
            status: obj.get("status").and_then(text_value),
            message: obj.get("message").and_then(text_value),
            error: obj.get("error").and_then(text_value),
            data: obj.get("data").cloned(),
        }
    }

    /// `code == 200` is success; any other code is failure regardless of
    /// the HTTP status. A reply without a code counts as success.
    pub fn is_success(&self) -> bool {
        self.code.map_or(true, |code| code == 200)
    }

    /// The server's explanation: `message`, else `error`.
    pub fn failure_message(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Keys that mark an object as a reply envelope rather than a record.
const ENVELOPE_KEYS: [&str; 4] = ["code", "status", "message", "error"];

/// Extracts the single record from a fetch-by-id response.
///
/// Accepts `{ data: {...} }`, `{ data: [{...}] }`, a record wrapped under
/// its singular key, or the bare record. An envelope without a record
/// (`{ code: 200, message: "..." }`) yields `None`.
pub fn unwrap_record(raw: &Value, singular_key: &str, id_field: &str) -> Option<Map<String, Value>> {
    let candidate = match raw.get("data") {
        Some(Value::Object(obj)) => obj,
        Some(Value::Array(items)) => items.first().and_then(Value::as_object)?,
        Some(_) => return None,
        None => {
            let obj = raw.as_object()?;
            if let Some(Value::Object(inner)) = obj.get(singular_key) {
                return Some(inner.clone());
            }
            let is_envelope = ENVELOPE_KEYS.iter().any(|key| obj.contains_key(*key));
            if is_envelope && !obj.contains_key(id_field) {
                return None;
            }
            return Some(obj.clone());
        }
    };

    match candidate.get(singular_key) {
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => Some(candidate.clone()),
    }
}
