//! Test-only doubles. Compiled under `cfg(test)` only; nothing here is reachable
//! from the daemon.

use crate::remote::{Remote, WriteError};
use crate::schema::Schema;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryRemote {
    resources: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_status: Mutex<Option<u16>>,
    fail_fetch: Mutex<bool>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, resource: &str, data: Value) -> Self {
        self.resources.lock().insert(resource.to_string(), data);
        self
    }

    pub fn fail_writes_with(&self, status: u16) {
        *self.fail_status.lock() = Some(status);
    }

    pub fn fail_fetches(&self) {
        *self.fail_fetch.lock() = true;
    }

    pub fn slow_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// `(endpoint, body)` for every accepted or rejected write, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }

    pub fn stored(&self, resource: &str) -> Option<Value> {
        self.resources.lock().get(resource).cloned()
    }
}

impl Remote for MemoryRemote {
    fn fetch(&self, schema: &Schema) -> anyhow::Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        if *self.fail_fetch.lock() {
            anyhow::bail!("GET {} failed: connection refused", schema.resource);
        }
        Ok(self
            .resources
            .lock()
            .get(schema.resource)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    fn write(&self, schema: &Schema, body: &str) -> Result<(), WriteError> {
        self.writes
            .lock()
            .push((schema.write_endpoint.to_string(), body.to_string()));
        if let Some(status) = *self.fail_status.lock() {
            return Err(WriteError::Status(status));
        }
        let parsed: Value =
            serde_json::from_str(body).map_err(|e| WriteError::Transport(e.to_string()))?;
        self.resources
            .lock()
            .insert(schema.resource.to_string(), parsed);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
