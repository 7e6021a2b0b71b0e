use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog;
use crate::config::Config;
use crate::remote::{DirRemote, HttpRemote, Remote};
use crate::store::RecordStore;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Workspace(PathBuf),
    Http(String),
}

/// One store per collection, all sharing the same remote.
pub struct Backend {
    pub location: Location,
    pub downloads_dir: PathBuf,
    stores: Vec<RecordStore>,
}

impl Backend {
    pub fn new(location: Location, remote: Arc<dyn Remote>, downloads_dir: &Path) -> Self {
        let stores = catalog::all()
            .into_iter()
            .map(|schema| RecordStore::new(schema, remote.clone(), downloads_dir))
            .collect();
        Self {
            location,
            downloads_dir: downloads_dir.to_path_buf(),
            stores,
        }
    }

    pub fn workspace(path: &Path, downloads_dir: &Path) -> anyhow::Result<Self> {
        let remote = DirRemote::new(path)?;
        Ok(Self::new(
            Location::Workspace(path.to_path_buf()),
            Arc::new(remote),
            downloads_dir,
        ))
    }

    pub fn http(base_url: &str, config: &Config, downloads_dir: &Path) -> anyhow::Result<Self> {
        let remote = HttpRemote::new(base_url, Some(config.http_timeout), config.retry)?;
        Ok(Self::new(
            Location::Http(remote.describe()),
            Arc::new(remote),
            downloads_dir,
        ))
    }

    /// Accepts `students`, `student` or a resource stem such as `entity`.
    pub fn store(&self, collection: &str) -> Option<&RecordStore> {
        let schema = catalog::by_name(collection)?;
        self.stores.iter().find(|s| s.schema().name == schema.name)
    }

    pub fn stores(&self) -> &[RecordStore] {
        &self.stores
    }

    pub fn describe(&self) -> serde_json::Value {
        match &self.location {
            Location::Workspace(p) => json!({
                "kind": "workspace",
                "workspacePath": p.to_string_lossy(),
                "downloadsDir": self.downloads_dir.to_string_lossy(),
            }),
            Location::Http(url) => json!({
                "kind": "http",
                "baseUrl": url,
                "downloadsDir": self.downloads_dir.to_string_lossy(),
            }),
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub backend: Option<Backend>,
}

impl AppState {
    /// Opens the configured backend, if any. The workspace wins over a base URL.
    pub fn from_config(config: Config) -> Self {
        let opened = if let Some(ws) = config.workspace.clone() {
            let downloads = config.downloads_for(Some(ws.as_path()));
            Some(Backend::workspace(&ws, &downloads))
        } else if let Some(url) = config.base_url.clone() {
            let downloads = config.downloads_for(None);
            Some(Backend::http(&url, &config, &downloads))
        } else {
            None
        };
        let backend = match opened {
            Some(Ok(b)) => {
                tracing::info!(backend = %b.describe(), "backend ready");
                Some(b)
            }
            Some(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "failed to open configured backend");
                None
            }
            None => None,
        };
        Self { config, backend }
    }
}
