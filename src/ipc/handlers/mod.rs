pub mod core;
pub mod records;
pub mod transfer;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::RecordStore;

pub(crate) fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Per-request `actor` param, else the configured default.
pub(crate) fn actor(state: &AppState, req: &Request) -> String {
    param_str(req, "actor")
        .map(str::to_string)
        .unwrap_or_else(|| state.config.actor.clone())
}

pub(crate) fn store_for<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a RecordStore, serde_json::Value> {
    let Some(backend) = state.backend.as_ref() else {
        return Err(err(
            &req.id,
            "no_workspace",
            "select a workspace or remote first",
            None,
        ));
    };
    let Some(name) = param_str(req, "collection") else {
        return Err(err(&req.id, "bad_params", "missing params.collection", None));
    };
    backend.store(name).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown collection: {name}"),
            None,
        )
    })
}
