use crate::convert::{fill_defaults, looks_flattened, unflatten, UnflattenMode};
use crate::error::{StoreError, StoreResult};
use crate::merge::{self, ImportReport};
use crate::record::{
    normalized_key, stamp, text_at, touch, Record, CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY,
};
use crate::remote::Remote;
use crate::schema::Schema;
use crate::sink::{PersistenceResult, PersistenceSink};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a store mutation: the value, what happened to the write, and how long
/// the whole operation took.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub value: T,
    pub persistence: PersistenceResult,
    pub elapsed: Duration,
}

/// Next free id for `schema` given the ids already taken.
pub fn generate_id<'a>(
    schema: &Schema,
    taken: impl IntoIterator<Item = &'a str>,
) -> StoreResult<String> {
    schema.ids.next(taken)
}

pub fn record_id(schema: &Schema, record: &Record) -> Option<String> {
    text_at(record, schema.id_field)
}

/// Primary id first, then each unique field in schema order.
pub fn check_duplicates(
    schema: &Schema,
    records: &[Record],
    candidate: &Record,
    skip: Option<usize>,
) -> StoreResult<()> {
    let others = || {
        records
            .iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != skip)
            .map(|(_, r)| r)
    };
    if let Some(id) = record_id(schema, candidate) {
        if others().any(|r| record_id(schema, r).as_deref() == Some(id.as_str())) {
            return Err(StoreError::Duplicate {
                field: schema.id_field.to_string(),
                value: id,
            });
        }
    }
    for path in &schema.unique {
        let Some(value) = text_at(candidate, path) else {
            continue;
        };
        let key = normalized_key(&value);
        if others().any(|r| text_at(r, path).map(|v| normalized_key(&v)) == Some(key.clone())) {
            return Err(StoreError::Duplicate {
                field: path.to_string(),
                value,
            });
        }
    }
    Ok(())
}

pub struct RecordStore {
    schema: Schema,
    remote: Arc<dyn Remote>,
    sink: PersistenceSink,
    cache: Mutex<Option<Arc<Vec<Record>>>>,
}

impl RecordStore {
    pub fn new(schema: Schema, remote: Arc<dyn Remote>, downloads_dir: &Path) -> Self {
        let sink = PersistenceSink::new(remote.clone(), downloads_dir);
        Self {
            schema,
            remote,
            sink,
            cache: Mutex::new(None),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn fetch_records(&self) -> StoreResult<Vec<Record>> {
        let started = Instant::now();
        let raw = self
            .remote
            .fetch(&self.schema)
            .map_err(|e| StoreError::Remote(format!("{e:#}")))?;
        let items = match raw {
            Value::Array(items) => items,
            other => {
                tracing::warn!(
                    collection = self.schema.name,
                    kind = json_kind(&other),
                    "backing resource is not an array; treating as empty"
                );
                Vec::new()
            }
        };
        let mut records = Vec::with_capacity(items.len());
        let mut converted = 0usize;
        for item in items {
            let Value::Object(obj) = item else {
                tracing::warn!(collection = self.schema.name, "skipping non-object entry");
                continue;
            };
            if looks_flattened(&self.schema, &obj) {
                converted += 1;
                records.push(unflatten(&self.schema, &obj, UnflattenMode::FillDefaults));
            } else {
                records.push(obj);
            }
        }
        tracing::debug!(
            collection = self.schema.name,
            records = records.len(),
            converted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded collection"
        );
        Ok(records)
    }

    fn ensure_loaded(&self, slot: &mut Option<Arc<Vec<Record>>>) -> StoreResult<Arc<Vec<Record>>> {
        if let Some(current) = slot.as_ref() {
            return Ok(current.clone());
        }
        let loaded = Arc::new(self.fetch_records()?);
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Current collection, fetching it on first use.
    pub fn get_all(&self) -> StoreResult<Arc<Vec<Record>>> {
        let mut guard = self.cache.lock();
        self.ensure_loaded(&mut guard)
    }

    /// Drops the cache and fetches the whole collection again.
    pub fn reload(&self) -> StoreResult<Arc<Vec<Record>>> {
        let mut guard = self.cache.lock();
        *guard = None;
        self.ensure_loaded(&mut guard)
    }

    /// Cached snapshot without triggering a fetch.
    pub fn snapshot(&self) -> Option<Arc<Vec<Record>>> {
        self.cache.lock().clone()
    }

    pub fn get(&self, id: &str) -> StoreResult<Record> {
        self.get_all()?
            .iter()
            .find(|r| record_id(&self.schema, r).as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    pub fn find(&self, pred: impl Fn(&Record) -> bool) -> StoreResult<Vec<Record>> {
        Ok(self.get_all()?.iter().filter(|r| pred(*r)).cloned().collect())
    }

    pub fn next_id(&self) -> StoreResult<String> {
        let all = self.get_all()?;
        generate_id(
            &self.schema,
            all.iter().filter_map(|r| r.get(self.schema.id_field)?.as_str()),
        )
    }

    /// Copy-on-write: `f` edits a private copy; the cache is swapped only when `f`
    /// succeeds, then the full collection is persisted.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<Record>) -> StoreResult<T>,
    ) -> StoreResult<Mutation<T>> {
        let started = Instant::now();
        let mut guard = self.cache.lock();
        let current = self.ensure_loaded(&mut guard)?;
        let mut next = (*current).clone();
        let value = f(&mut next)?;
        let persistence = self.sink.persist(&self.schema, &next);
        *guard = Some(Arc::new(next));
        Ok(Mutation {
            value,
            persistence,
            elapsed: started.elapsed(),
        })
    }

    fn index_of(&self, records: &[Record], id: &str) -> StoreResult<usize> {
        records
            .iter()
            .position(|r| record_id(&self.schema, r).as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    pub fn create(&self, data: Record, actor: &str) -> StoreResult<Mutation<Record>> {
        let schema = &self.schema;
        let out = self.mutate(|records| {
            let mut record = data;
            for key in [CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY] {
                record.remove(key);
            }
            stamp(&mut record, actor);
            fill_defaults(schema, &mut record);
            let issues = schema.validate(&record);
            if !issues.is_empty() {
                return Err(StoreError::Validation { issues });
            }
            check_duplicates(schema, records, &record, None)?;
            if record_id(schema, &record).is_none() {
                let id = generate_id(
                    schema,
                    records.iter().filter_map(|r| r.get(schema.id_field)?.as_str()),
                )?;
                record.insert(schema.id_field.to_string(), Value::String(id));
            }
            records.push(record.clone());
            Ok(record)
        })?;
        tracing::info!(
            collection = schema.name,
            id = %record_id(schema, &out.value).unwrap_or_default(),
            durable = out.persistence.is_durable(),
            elapsed_ms = out.elapsed.as_millis() as u64,
            "created record"
        );
        Ok(out)
    }

    /// Shallow overwrite: every key in `patch` replaces the stored value, blanks
    /// included. The id and `created_*` are never changed.
    pub fn update(&self, id: &str, patch: Record, actor: &str) -> StoreResult<Mutation<Record>> {
        let schema = &self.schema;
        let out = self.mutate(|records| {
            let idx = self.index_of(records, id)?;
            let mut merged = records[idx].clone();
            for (k, v) in patch {
                if k == schema.id_field
                    || k == CREATED_AT
                    || k == CREATED_BY
                    || k == UPDATED_AT
                    || k == UPDATED_BY
                {
                    continue;
                }
                merged.insert(k, v);
            }
            let issues = schema.validate(&merged);
            if !issues.is_empty() {
                return Err(StoreError::Validation { issues });
            }
            check_duplicates(schema, records, &merged, Some(idx))?;
            touch(&mut merged, actor, &crate::record::now_iso());
            records[idx] = merged.clone();
            Ok(merged)
        })?;
        tracing::info!(
            collection = schema.name,
            id,
            durable = out.persistence.is_durable(),
            elapsed_ms = out.elapsed.as_millis() as u64,
            "updated record"
        );
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> StoreResult<Mutation<bool>> {
        let out = self.mutate(|records| {
            let idx = self.index_of(records, id)?;
            records.remove(idx);
            Ok(true)
        })?;
        tracing::info!(
            collection = self.schema.name,
            id,
            durable = out.persistence.is_durable(),
            "deleted record"
        );
        Ok(out)
    }

    /// Dry run of an import against the current collection. Nothing is stored.
    pub fn preview_import(&self, incoming: Vec<Record>, actor: &str) -> StoreResult<ImportReport> {
        let current = self.get_all()?;
        let outcome = merge::merge(&self.schema, &current, incoming, actor)?;
        Ok(outcome.report)
    }

    pub fn import(&self, incoming: Vec<Record>, actor: &str) -> StoreResult<Mutation<ImportReport>> {
        let schema = &self.schema;
        let out = self.mutate(|records| {
            let outcome = merge::merge(schema, records, incoming, actor)?;
            *records = outcome.records;
            Ok(outcome.report)
        })?;
        tracing::info!(
            collection = schema.name,
            batch = %out.value.summary.batch_id,
            added = out.value.summary.added,
            updated = out.value.summary.updated,
            reassigned = out.value.summary.reassigned,
            total = out.value.summary.total,
            durable = out.persistence.is_durable(),
            "import applied"
        );
        Ok(out)
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
