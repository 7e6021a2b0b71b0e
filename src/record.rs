use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A schema-typed nested record, kept as an open JSON object so fields the schema
/// does not know survive load/save untouched.
pub type Record = Map<String, Value>;

/// Single-level row used for CSV/XLSX interchange.
pub type Row = Map<String, Value>;

pub const CREATED_AT: &str = "created_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_AT: &str = "updated_at";
pub const UPDATED_BY: &str = "updated_by";

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = record.get(first)?;
    for p in parts {
        cur = cur.as_object()?.get(p)?;
    }
    Some(cur)
}

/// Sets a dotted path, creating intermediate objects. A non-object value sitting on
/// the way is replaced.
pub fn set_path(record: &mut Record, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(leaf) = parts.pop() else {
        return;
    };
    let mut cur = record;
    for p in parts {
        let slot = cur
            .entry(p.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cur = next;
    }
    cur.insert(leaf.to_string(), value);
}

pub fn get_str<'a>(record: &'a Record, path: &str) -> Option<&'a str> {
    get_path(record, path).and_then(|v| v.as_str())
}

/// Text form of a scalar used for duplicate and identity comparisons.
pub fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

pub fn text_at(record: &Record, path: &str) -> Option<String> {
    get_path(record, path).and_then(scalar_text)
}

/// Blank means "carries no information": null, whitespace-only text, empty list or
/// an object whose every value is blank.
pub fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.values().all(is_blank),
        _ => false,
    }
}

pub fn normalized_key(s: &str) -> String {
    s.trim().to_lowercase()
}

fn parse_ts(v: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = v?.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Sets `created_*` (only when absent) and refreshes `updated_*`.
/// `updated_at` never lands before `created_at`.
pub fn stamp(record: &mut Record, actor: &str) {
    let now = now_iso();
    if parse_ts(record.get(CREATED_AT)).is_none() {
        record.insert(CREATED_AT.to_string(), Value::String(now.clone()));
    }
    if get_str(record, CREATED_BY).map(|s| s.trim().is_empty()).unwrap_or(true) {
        record.insert(CREATED_BY.to_string(), Value::String(actor.to_string()));
    }
    touch(record, actor, &now);
}

pub fn touch(record: &mut Record, actor: &str, now: &str) {
    let created = parse_ts(record.get(CREATED_AT));
    let current = DateTime::parse_from_rfc3339(now)
        .ok()
        .map(|d| d.with_timezone(&Utc));
    let updated = match (created, current) {
        (Some(c), Some(n)) if c > n => record.get(CREATED_AT).cloned(),
        _ => None,
    }
    .unwrap_or_else(|| Value::String(now.to_string()));
    record.insert(UPDATED_AT.to_string(), updated);
    record.insert(UPDATED_BY.to_string(), Value::String(actor.to_string()));
}
