use crate::schema::Schema;
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("write rejected with HTTP {0}")]
    Status(u16),
    #[error("write failed: {0}")]
    Transport(String),
}

/// Where a collection's backing JSON lives and how a full replacement is written.
pub trait Remote: Send + Sync {
    /// Reads the whole backing resource. A workspace file that does not exist yet is
    /// `[]`; over HTTP every non-success status is an error.
    fn fetch(&self, schema: &Schema) -> anyhow::Result<Value>;

    /// Replaces the whole backing resource with `body`.
    fn write(&self, schema: &Schema, body: &str) -> Result<(), WriteError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Runs `op` up to `attempts` times, sleeping `attempt * backoff` between tries.
pub fn with_retry<T>(
    policy: RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let attempts = policy.attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::debug!(attempt, attempts, error = %e, "{} failed", what);
                last = Some(e);
                if attempt < attempts {
                    std::thread::sleep(policy.backoff * attempt);
                }
            }
        }
    }
    Err(last.unwrap_or_else(|| anyhow!("{} failed", what)))
}

pub struct HttpRemote {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Option<Duration>, retry: RetryPolicy) -> anyhow::Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Remote for HttpRemote {
    fn fetch(&self, schema: &Schema) -> anyhow::Result<Value> {
        let url = self.url(schema.resource);
        with_retry(self.retry, &format!("GET {url}"), || {
            let resp = self
                .client
                .get(&url)
                .send()
                .with_context(|| format!("GET {url}"))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("GET {url} returned HTTP {}", status.as_u16()));
            }
            resp.json::<Value>()
                .with_context(|| format!("GET {url} returned invalid JSON"))
        })
    }

    fn write(&self, schema: &Schema, body: &str) -> Result<(), WriteError> {
        let url = self.url(schema.write_endpoint);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(|e| WriteError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(WriteError::Status(resp.status().as_u16()))
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Workspace directory holding the resource files directly.
pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("failed to create workspace {}", root.to_string_lossy()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl Remote for DirRemote {
    fn fetch(&self, schema: &Schema) -> anyhow::Result<Value> {
        let path = self.root.join(schema.resource);
        if !path.is_file() {
            return Ok(Value::Array(Vec::new()));
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        if text.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.to_string_lossy()))
    }

    fn write(&self, schema: &Schema, body: &str) -> Result<(), WriteError> {
        let path = self.root.join(schema.resource);
        let tmp = self.root.join(format!(".{}.tmp", schema.resource));
        std::fs::write(&tmp, body).map_err(|e| WriteError::Transport(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| WriteError::Transport(e.to_string()))
    }

    fn describe(&self) -> String {
        self.root.to_string_lossy().to_string()
    }
}
