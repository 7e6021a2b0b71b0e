use crate::ipc::error::{err, ok};
use crate::ipc::handlers::param_str;
use crate::ipc::types::{AppState, Backend, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.backend.as_ref().map(|b| b.describe()),
            "actor": state.config.actor,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = param_str(req, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let downloads = param_str(req, "downloadsDir")
        .map(PathBuf::from)
        .unwrap_or_else(|| state.config.downloads_for(Some(path.as_path())));

    match Backend::workspace(&path, &downloads) {
        Ok(backend) => {
            let described = backend.describe();
            tracing::info!(workspace = %path.display(), "workspace selected");
            state.backend = Some(backend);
            ok(&req.id, described)
        }
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_remote_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = param_str(req, "baseUrl") else {
        return err(&req.id, "bad_params", "missing params.baseUrl", None);
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return err(
            &req.id,
            "bad_params",
            "baseUrl must start with http:// or https://",
            None,
        );
    }
    let downloads = param_str(req, "downloadsDir")
        .map(PathBuf::from)
        .unwrap_or_else(|| state.config.downloads_for(None));

    match Backend::http(base_url, &state.config, &downloads) {
        Ok(backend) => {
            let described = backend.describe();
            tracing::info!(base_url, "remote selected");
            state.backend = Some(backend);
            ok(&req.id, described)
        }
        Err(e) => err(&req.id, "remote_failed", format!("{e:#}"), None),
    }
}

fn handle_collections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(backend) = state.backend.as_ref() else {
        return err(
            &req.id,
            "no_workspace",
            "select a workspace or remote first",
            None,
        );
    };
    let collections: Vec<serde_json::Value> = backend
        .stores()
        .iter()
        .map(|store| {
            let schema = store.schema();
            json!({
                "name": schema.name,
                "resource": schema.resource,
                "writeEndpoint": schema.write_endpoint,
                "idPrefix": schema.ids.prefix,
                "columns": schema.columns(),
                "loadedCount": store.snapshot().map(|s| s.len()),
            })
        })
        .collect();
    ok(&req.id, json!({ "collections": collections }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "remote.select" => Some(handle_remote_select(state, req)),
        "collections.list" => Some(handle_collections_list(state, req)),
        _ => None,
    }
}
