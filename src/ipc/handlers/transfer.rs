use crate::export::{self, ExportFormat};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::handlers::{actor, param_str, store_for};
use crate::ipc::types::{AppState, Request};
use crate::merge::read_incoming;
use serde_json::json;
use std::path::PathBuf;

fn import_path(req: &Request) -> Result<PathBuf, serde_json::Value> {
    let Some(path) = param_str(req, "path").map(PathBuf::from) else {
        return Err(err(&req.id, "bad_params", "missing params.path", None));
    };
    if !path.is_file() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("file not found: {}", path.to_string_lossy()),
            None,
        ));
    }
    Ok(path)
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let path = match import_path(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = read_incoming(store.schema(), &path)
        .and_then(|incoming| store.preview_import(incoming, &actor(state, req)));
    match result {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_import_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let path = match import_path(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = read_incoming(store.schema(), &path)
        .and_then(|incoming| store.import(incoming, &actor(state, req)));
    match result {
        Ok(m) => ok(
            &req.id,
            json!({
                "summary": m.value.summary,
                "rows": m.value.rows,
                "persistence": m.persistence,
                "elapsedMs": m.elapsed.as_millis() as u64,
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn out_dir(state: &AppState, req: &Request) -> PathBuf {
    param_str(req, "outDir")
        .map(PathBuf::from)
        .or_else(|| state.backend.as_ref().map(|b| b.downloads_dir.clone()))
        .unwrap_or_else(|| state.config.downloads_for(None))
}

fn handle_export_write(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let format = match param_str(req, "format") {
        None => ExportFormat::Json,
        Some(f) => match ExportFormat::parse(f) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unsupported export format: {f}"),
                    None,
                )
            }
        },
    };
    let records = match store.get_all() {
        Ok(r) => r,
        Err(e) => return store_err(&req.id, &e),
    };
    match export::export_collection(store.schema(), &records, format, &out_dir(state, req)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": summary.path.to_string_lossy(),
                "rows": summary.rows,
                "columns": summary.columns,
            }),
        ),
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_export_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_for(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match export::write_template(store.schema(), &out_dir(state, req)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": summary.path.to_string_lossy(),
                "columns": summary.columns,
            }),
        ),
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_import_preview(state, req)),
        "import.apply" => Some(handle_import_apply(state, req)),
        "export.write" => Some(handle_export_write(state, req)),
        "export.template" => Some(handle_export_template(state, req)),
        _ => None,
    }
}
