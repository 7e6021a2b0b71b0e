//! Reconciles an imported batch against the current collection.

use crate::convert::{fill_defaults, looks_flattened, unflatten, UnflattenMode};
use crate::error::{StoreError, StoreResult};
use crate::record::{
    is_blank, normalized_key, now_iso, stamp, text_at, touch, Record, CREATED_AT, CREATED_BY,
    UPDATED_AT, UPDATED_BY,
};
use crate::schema::Schema;
use crate::tabular::{self, SourceFormat};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RowAction {
    Added,
    Updated,
    /// Id already taken by a different real-world record; a fresh id was assigned.
    Reassigned,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row: usize,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    pub name: Option<String>,
    pub action: RowAction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub batch_id: String,
    /// New records, reassigned collisions included.
    pub added: usize,
    pub updated: usize,
    pub reassigned: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub summary: ImportSummary,
    pub rows: Vec<RowOutcome>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: Vec<Record>,
    pub report: ImportReport,
}

fn is_metadata(key: &str, schema: &Schema) -> bool {
    key == schema.id_field
        || key == CREATED_AT
        || key == CREATED_BY
        || key == UPDATED_AT
        || key == UPDATED_BY
}

/// Only non-blank incoming values land; nested groups are merged the same way.
pub fn safe_merge(existing: &mut Record, incoming: &Record) {
    for (key, value) in incoming {
        if is_blank(value) {
            continue;
        }
        match (existing.get_mut(key), value) {
            (Some(Value::Object(current)), Value::Object(inner)) => safe_merge(current, inner),
            (_, Value::Object(inner)) => {
                let mut fresh = Record::new();
                safe_merge(&mut fresh, inner);
                existing.insert(key.clone(), Value::Object(fresh));
            }
            _ => {
                existing.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Same real-world record unless some identity field is present on both sides and
/// none of those agree (case-insensitive).
pub fn same_identity(schema: &Schema, existing: &Record, incoming: &Record) -> bool {
    let mut compared = false;
    for path in &schema.identity {
        if let (Some(a), Some(b)) = (text_at(existing, path), text_at(incoming, path)) {
            if normalized_key(&a) == normalized_key(&b) {
                return true;
            }
            compared = true;
        }
    }
    !compared
}

fn validated(schema: &Schema, record: &Record, row: usize) -> StoreResult<()> {
    let issues = schema.validate(record);
    if issues.is_empty() {
        return Ok(());
    }
    Err(StoreError::Import {
        row,
        name: text_at(record, schema.name_field),
        source: Box::new(StoreError::Validation { issues }),
    })
}

pub fn merge(
    schema: &Schema,
    existing: &[Record],
    incoming: Vec<Record>,
    actor: &str,
) -> StoreResult<MergeOutcome> {
    let batch_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("import", collection = schema.name, batch = %batch_id);
    let _enter = span.enter();

    let mut records = existing.to_vec();
    let mut index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| Some((text_at(r, schema.id_field)?, i)))
        .collect();
    let mut rows = Vec::with_capacity(incoming.len());
    let (mut added, mut updated, mut reassigned) = (0usize, 0usize, 0usize);

    for (pos, mut candidate) in incoming.into_iter().enumerate() {
        let row = pos + 1;
        let wanted = text_at(&candidate, schema.id_field);

        if let Some(id) = wanted.as_deref() {
            if let Some(&at) = index.get(id) {
                if same_identity(schema, &records[at], &candidate) {
                    let mut merged = records[at].clone();
                    candidate.retain(|k, _| !is_metadata(k, schema));
                    safe_merge(&mut merged, &candidate);
                    touch(&mut merged, actor, &now_iso());
                    validated(schema, &merged, row)?;
                    rows.push(RowOutcome {
                        row,
                        id: id.to_string(),
                        previous_id: None,
                        name: text_at(&merged, schema.name_field),
                        action: RowAction::Updated,
                    });
                    records[at] = merged;
                    updated += 1;
                    continue;
                }
            }
        }

        let collided = wanted.as_deref().map(|id| index.contains_key(id)).unwrap_or(false);
        let id = match wanted.as_deref() {
            Some(id) if !collided => id.to_string(),
            _ => schema
                .ids
                .next(index.keys().map(String::as_str))
                .map_err(|e| StoreError::Import {
                    row,
                    name: text_at(&candidate, schema.name_field),
                    source: Box::new(e),
                })?,
        };
        candidate.insert(schema.id_field.to_string(), Value::String(id.clone()));
        stamp(&mut candidate, actor);
        fill_defaults(schema, &mut candidate);
        validated(schema, &candidate, row)?;

        let action = if collided {
            tracing::warn!(
                row,
                previous_id = wanted.as_deref().unwrap_or_default(),
                assigned_id = %id,
                "id collision with a different record; assigned a new id"
            );
            reassigned += 1;
            RowAction::Reassigned
        } else {
            RowAction::Added
        };
        rows.push(RowOutcome {
            row,
            id: id.clone(),
            previous_id: if collided { wanted.clone() } else { None },
            name: text_at(&candidate, schema.name_field),
            action,
        });
        index.insert(id, records.len());
        records.push(candidate);
        added += 1;
    }

    let summary = ImportSummary {
        batch_id,
        added,
        updated,
        reassigned,
        total: records.len(),
    };
    tracing::debug!(added, updated, reassigned, total = summary.total, "merge complete");
    Ok(MergeOutcome {
        records,
        report: ImportReport { summary, rows },
    })
}

/// Reads an import file into nested records. Tabular rows and flattened JSON objects
/// are unflattened sparsely so absent columns never overwrite stored values.
pub fn read_incoming(schema: &Schema, path: &Path) -> StoreResult<Vec<Record>> {
    match SourceFormat::from_path(path) {
        Some(SourceFormat::Json) => {
            let text = std::fs::read_to_string(path)?;
            let parsed: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
                .map_err(|e| StoreError::parse(format!("invalid JSON: {e}")))?;
            let Value::Array(items) = parsed else {
                return Err(StoreError::parse("expected a JSON array of records"));
            };
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(obj) if looks_flattened(schema, &obj) => {
                        Ok(unflatten(schema, &obj, UnflattenMode::Sparse))
                    }
                    Value::Object(obj) => Ok(obj),
                    _ => Err(StoreError::parse(format!("entry {} is not an object", i + 1))),
                })
                .collect()
        }
        Some(_) => Ok(tabular::parse_file(schema, path)?
            .iter()
            .map(|row| unflatten(schema, row, UnflattenMode::Sparse))
            .collect()),
        None => Err(StoreError::parse(format!(
            "unsupported import file: {}",
            path.to_string_lossy()
        ))),
    }
}
