use crate::record::Record;
use crate::remote::Remote;
use crate::schema::Schema;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a persist call. `DownloadFallback` means the data was NOT stored
/// remotely: a copy was handed off as a file and someone has to replace the
/// backing resource with it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PersistenceResult {
    #[serde(rename_all = "camelCase")]
    Durable { target: String, sha256: String },
    #[serde(rename_all = "camelCase")]
    DownloadFallback {
        path: PathBuf,
        reason: String,
        sha256: String,
    },
}

impl PersistenceResult {
    pub fn is_durable(&self) -> bool {
        matches!(self, PersistenceResult::Durable { .. })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct PersistenceSink {
    remote: Arc<dyn Remote>,
    downloads_dir: PathBuf,
}

impl PersistenceSink {
    pub fn new(remote: Arc<dyn Remote>, downloads_dir: &Path) -> Self {
        Self {
            remote,
            downloads_dir: downloads_dir.to_path_buf(),
        }
    }

    /// Never fails: a rejected or failed write degrades to a file hand-off.
    pub fn persist(&self, schema: &Schema, records: &[Record]) -> PersistenceResult {
        let body = match serde_json::to_string_pretty(records) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(collection = schema.name, error = %e, "failed to serialize collection");
                return PersistenceResult::DownloadFallback {
                    path: PathBuf::new(),
                    reason: format!("serialize failed: {e}"),
                    sha256: String::new(),
                };
            }
        };
        match self.remote.write(schema, &body) {
            Ok(()) => {
                let sha256 = sha256_hex(body.as_bytes());
                tracing::info!(
                    collection = schema.name,
                    records = records.len(),
                    target = %self.remote.describe(),
                    "persisted collection"
                );
                PersistenceResult::Durable {
                    target: format!("{}{}", self.remote.describe(), schema.write_endpoint),
                    sha256,
                }
            }
            Err(e) => self.fallback(schema, &body, e.to_string()),
        }
    }

    fn fallback(&self, schema: &Schema, body: &str, reason: String) -> PersistenceResult {
        let path = self.downloads_dir.join(schema.resource);
        let sha256 = sha256_hex(body.as_bytes());
        let written = std::fs::create_dir_all(&self.downloads_dir)
            .and_then(|_| std::fs::write(&path, body));
        let reason = match written {
            Ok(()) => {
                tracing::warn!(
                    collection = schema.name,
                    path = %path.display(),
                    reason = %reason,
                    "remote write failed; download written, replace {} manually",
                    schema.resource
                );
                reason
            }
            Err(e) => {
                tracing::error!(
                    collection = schema.name,
                    path = %path.display(),
                    reason = %reason,
                    error = %e,
                    "remote write failed and the download could not be written"
                );
                format!("{reason}; download not written: {e}")
            }
        };
        PersistenceResult::DownloadFallback {
            path,
            reason,
            sha256,
        }
    }
}
