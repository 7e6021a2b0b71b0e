//! Nested record <-> flat row conversion used for CSV/XLSX interchange.

use crate::record::{get_path, is_blank, set_path, Record, Row};
use crate::schema::{FieldKind, Schema};
use serde_json::Value;

pub const LIST_DELIMITER: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnflattenMode {
    /// Absent fields get their type default.
    FillDefaults,
    /// Only present, non-blank columns are emitted.
    Sparse,
}

pub fn flatten(record: &Record) -> Row {
    let mut row = Row::new();
    flatten_into(&mut row, "", record);
    row
}

fn flatten_into(row: &mut Row, prefix: &str, obj: &Record) {
    for (k, v) in obj {
        let column = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{}_{}", prefix, k)
        };
        match v {
            Value::Object(inner) => flatten_into(row, &column, inner),
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(LIST_DELIMITER);
                row.insert(column, Value::String(joined));
            }
            Value::Null => {
                row.insert(column, Value::String(String::new()));
            }
            other => {
                row.insert(column, other.clone());
            }
        }
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_int(s: &str) -> i64 {
    let t = s.trim();
    t.parse::<i64>()
        .ok()
        .or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        .unwrap_or(0)
}

fn coerce(v: &Value, kind: FieldKind, mode: UnflattenMode) -> Option<Value> {
    if mode == UnflattenMode::Sparse && is_blank(v) {
        return None;
    }
    if v.is_object() {
        return Some(v.clone());
    }
    let out = match kind {
        // Typed values in text columns are kept as they are.
        FieldKind::Text => match v {
            Value::Number(_) | Value::Bool(_) => v.clone(),
            other => Value::String(text_of(other)),
        },
        FieldKind::Integer => match v {
            Value::Number(n) if n.is_i64() || n.is_u64() => v.clone(),
            Value::Number(n) => Value::from(n.as_f64().map(|f| f as i64).unwrap_or(0)),
            Value::Bool(b) => Value::from(i64::from(*b)),
            other => Value::from(parse_int(&text_of(other))),
        },
        FieldKind::Boolean => match v {
            Value::Bool(_) => v.clone(),
            Value::Number(n) => Value::Bool(n.as_i64() == Some(1)),
            other => {
                let s = text_of(other);
                Value::Bool(matches!(s.trim(), "true" | "TRUE" | "1"))
            }
        },
        FieldKind::List => match v {
            Value::Array(_) => v.clone(),
            other => Value::Array(
                text_of(other)
                    .split(LIST_DELIMITER)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
        },
    };
    Some(out)
}

pub fn unflatten(schema: &Schema, row: &Row, mode: UnflattenMode) -> Record {
    let mut record = Record::new();
    for (column, value) in row {
        let kind = schema.kind_for_column(column);
        let Some(v) = coerce(value, kind, mode) else {
            continue;
        };
        let path = schema.path_for_column(column);
        let group_exists = matches!(get_path(&record, &path), Some(Value::Object(_)));
        match v {
            // An already nested group meeting flattened keys for the same group.
            Value::Object(incoming) if group_exists => {
                for (k, inner) in incoming {
                    set_path(&mut record, &format!("{}.{}", path, k), inner);
                }
            }
            v => set_path(&mut record, &path, v),
        }
    }
    if mode == UnflattenMode::FillDefaults {
        fill_defaults(schema, &mut record);
    }
    record
}

pub fn fill_defaults(schema: &Schema, record: &mut Record) {
    for f in &schema.fields {
        if get_path(record, f.path).is_none() {
            set_path(record, f.path, f.default.value());
        }
    }
}

/// True when the object carries group-prefixed columns at the top level,
/// i.e. it was saved in the flattened shape.
pub fn looks_flattened(schema: &Schema, obj: &Record) -> bool {
    obj.keys().any(|k| {
        schema.groups.iter().any(|g| {
            k.strip_prefix(g)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| !rest.is_empty())
                .unwrap_or(false)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn full_entity() -> Record {
        obj(json!({
            "id": "INST1001",
            "name": "North Campus",
            "code": "NC",
            "type": "college",
            "description": "",
            "contact_info": {
                "email": "office@north.edu",
                "phone": "+1 555 0100",
                "website": "https://north.edu",
                "address": "1 Main St",
                "city": "Springfield",
                "state": "IL",
                "postal_code": "62701",
                "country": "US"
            },
            "academic_info": {
                "established_year": 1998,
                "accreditation": "A+",
                "affiliation": "State University",
                "programs_offered": ["BSc", "MSc"],
                "capacity": 1200
            },
            "is_active": true,
            "tags": [],
            "created_at": "2024-01-01T00:00:00.000Z",
            "created_by": "seed",
            "updated_at": "2024-01-02T00:00:00.000Z",
            "updated_by": "seed"
        }))
    }

    #[test]
    fn flatten_uses_parent_field_names_and_joins_lists() {
        let row = flatten(&full_entity());
        assert_eq!(row["contact_info_email"], "office@north.edu");
        assert_eq!(row["academic_info_programs_offered"], "BSc;MSc");
        assert_eq!(row["academic_info_capacity"], 1200);
        assert_eq!(row["tags"], "");
        assert!(!row.contains_key("contact_info"));
    }

    #[test]
    fn unflatten_inverts_flatten() {
        let schema = catalog::entities();
        let rec = full_entity();
        assert_eq!(unflatten(&schema, &flatten(&rec), UnflattenMode::FillDefaults), rec);
    }

    #[test]
    fn flatten_inverts_unflatten_for_known_columns() {
        let schema = catalog::entities();
        let row = flatten(&full_entity());
        let again = flatten(&unflatten(&schema, &row, UnflattenMode::FillDefaults));
        assert_eq!(again, row);
    }

    #[test]
    fn string_rows_are_coerced() {
        let schema = catalog::faculty();
        let row = obj(json!({
            "name": "Dr. Rao",
            "academic_info_experience_years": "12",
            "academic_info_joining_year": "not a year",
            "is_available_for_guidance": "TRUE",
            "subjects": "Algebra; Topology ;",
            "academic_info_specialization": ""
        }));
        let rec = unflatten(&schema, &row, UnflattenMode::FillDefaults);
        assert_eq!(rec["academic_info"]["experience_years"], 12);
        assert_eq!(rec["academic_info"]["joining_year"], 0);
        assert_eq!(rec["is_available_for_guidance"], true);
        assert_eq!(rec["subjects"], json!(["Algebra", "Topology"]));
        assert_eq!(rec["academic_info"]["specialization"], json!([]));
        assert_eq!(rec["employee_code"], "");
        assert!(rec["created_at"].as_str().is_some());
    }

    #[test]
    fn boolean_accepts_only_the_true_literals() {
        let schema = catalog::entities();
        for (raw, expected) in [("true", true), ("TRUE", true), ("1", true), ("yes", false), ("0", false)] {
            let rec = unflatten(&schema, &obj(json!({ "is_active": raw })), UnflattenMode::Sparse);
            assert_eq!(rec["is_active"], expected, "input {raw}");
        }
    }

    #[test]
    fn sparse_mode_skips_blank_and_absent_columns() {
        let schema = catalog::students();
        let row = obj(json!({
            "id": "STU20240001",
            "name": "",
            "academic_info_program": "BSc Physics",
            "academic_info_batch_year": ""
        }));
        let rec = unflatten(&schema, &row, UnflattenMode::Sparse);
        assert_eq!(
            Value::Object(rec),
            json!({ "id": "STU20240001", "academic_info": { "program": "BSc Physics" } })
        );
    }

    #[test]
    fn detects_flattened_shape() {
        let schema = catalog::entities();
        assert!(looks_flattened(&schema, &flatten(&full_entity())));
        assert!(!looks_flattened(&schema, &full_entity()));
    }

    proptest! {
        #[test]
        fn student_round_trip_law(
            name in "[A-Z][a-z]{1,12}( [A-Z][a-z]{1,12})?",
            program in "[A-Za-z ]{1,20}",
            semester in 0i64..12,
            batch in 1990i64..2100,
            active in any::<bool>(),
            tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
        ) {
            let schema = catalog::students();
            let mut rec = unflatten(&schema, &Row::new(), UnflattenMode::FillDefaults);
            rec.insert("name".into(), json!(name));
            rec.insert("is_active".into(), json!(active));
            rec.insert("tags".into(), json!(tags));
            set_path(&mut rec, "academic_info.program", json!(program));
            set_path(&mut rec, "academic_info.semester", json!(semester));
            set_path(&mut rec, "academic_info.batch_year", json!(batch));
            let back = unflatten(&schema, &flatten(&rec), UnflattenMode::FillDefaults);
            prop_assert_eq!(back, rec);
        }

        #[test]
        fn every_collection_round_trips_with_unknown_typed_fields(
            which in 0usize..4,
            count in any::<i64>(),
            verified in any::<bool>(),
            note in "[a-z ]{0,10}",
        ) {
            let schema = catalog::all().swap_remove(which);
            let mut rec = unflatten(&schema, &Row::new(), UnflattenMode::FillDefaults);
            rec.insert("legacy_count".into(), json!(count));
            rec.insert("verified".into(), json!(verified));
            rec.insert("legacy_note".into(), json!(note));
            let back = unflatten(&schema, &flatten(&rec), UnflattenMode::FillDefaults);
            prop_assert_eq!(back, rec);
        }
    }

    #[test]
    fn unknown_columns_keep_numbers_and_booleans() {
        let schema = catalog::entities();
        let mut rec = full_entity();
        rec.insert("legacy_count".into(), json!(5));
        rec.insert("verified".into(), json!(true));
        let back = unflatten(&schema, &flatten(&rec), UnflattenMode::FillDefaults);
        assert_eq!(back["legacy_count"], json!(5));
        assert_eq!(back["verified"], json!(true));
        assert_eq!(back, rec);
    }
}
