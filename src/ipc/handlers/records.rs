use crate::ipc::error::{err, ok, store_err};
use crate::ipc::handlers::{actor, param_str, store_for};
use crate::ipc::types::{AppState, Request};
use crate::record::{normalized_key, scalar_text, text_at, Record};
use crate::store::Mutation;
use serde::Serialize;
use serde_json::json;

fn mutation_json<T: Serialize>(key: &str, m: &Mutation<T>) -> serde_json::Value {
    let mut out = json!({
        "persistence": m.persistence,
        "elapsedMs": m.elapsed.as_millis() as u64,
    });
    out[key] = json!(m.value);
    out
}

fn record_param(req: &Request, key: &str) -> Option<Record> {
    req.params.get(key).and_then(|v| v.as_object()).cloned()
}

/// `where` is `{ "contact_info.email": "x@y" }`; every entry must match,
/// case-insensitively.
fn matches_where(record: &Record, filter: &Record) -> bool {
    filter.iter().all(|(path, wanted)| {
        match (text_at(record, path), scalar_text(wanted)) {
            (Some(have), Some(want)) => normalized_key(&have) == normalized_key(&want),
            (None, None) => true,
            _ => false,
        }
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let filter = record_param(req, "where");
    let result = match &filter {
        Some(f) => store.find(|r| matches_where(r, f)),
        None => store.get_all().map(|all| all.to_vec()),
    };
    match result {
        Ok(records) => ok(
            &req.id,
            json!({ "count": records.len(), "records": records }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(id) = param_str(req, "id") else {
        return err(&req.id, "bad_params", "missing params.id", None);
    };
    match store.get(id) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_next_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.next_id() {
        Ok(id) => ok(&req.id, json!({ "id": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(record) = record_param(req, "record") else {
        return err(&req.id, "bad_params", "missing params.record object", None);
    };
    match store.create(record, &actor(state, req)) {
        Ok(m) => ok(&req.id, mutation_json("record", &m)),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(id) = param_str(req, "id") else {
        return err(&req.id, "bad_params", "missing params.id", None);
    };
    let Some(patch) = record_param(req, "patch") else {
        return err(&req.id, "bad_params", "missing params.patch object", None);
    };
    match store.update(id, patch, &actor(state, req)) {
        Ok(m) => ok(&req.id, mutation_json("record", &m)),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(id) = param_str(req, "id") else {
        return err(&req.id, "bad_params", "missing params.id", None);
    };
    match store.delete(id) {
        Ok(m) => ok(&req.id, mutation_json("deleted", &m)),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.reload() {
        Ok(all) => ok(&req.id, json!({ "count": all.len() })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_list(state, req)),
        "records.get" => Some(handle_get(state, req)),
        "records.nextId" => Some(handle_next_id(state, req)),
        "records.create" => Some(handle_create(state, req)),
        "records.update" => Some(handle_update(state, req)),
        "records.delete" => Some(handle_delete(state, req)),
        "records.reload" => Some(handle_reload(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(v: serde_json::Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn where_filter_compares_nested_text_case_insensitively() {
        let r = obj(json!({"name": "Asha", "contact_info": {"email": "Asha@Uni.edu"}, "semester": 3}));
        assert!(matches_where(&r, &obj(json!({"contact_info.email": "asha@uni.edu"}))));
        assert!(matches_where(&r, &obj(json!({"semester": 3, "name": "ASHA"}))));
        assert!(!matches_where(&r, &obj(json!({"name": "Vikram"}))));
        assert!(!matches_where(&r, &obj(json!({"contact_info.phone": "1"}))));
    }
}
