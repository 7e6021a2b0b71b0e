use crate::remote::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Option<String>,
    /// Wins over `base_url` when both are set.
    pub workspace: Option<PathBuf>,
    pub downloads_dir: Option<PathBuf>,
    pub actor: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub log_json: bool,
    pub ignored: Vec<IgnoredVar>,
}

/// An environment variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredVar {
    pub name: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            workspace: None,
            downloads_dir: None,
            actor: "system".to_string(),
            http_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            log_json: false,
            ignored: Vec::new(),
        }
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Unparseable values fall back to the default and are listed in `ignored`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut ignored = Vec::new();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut number = |name: &'static str| {
            let raw = text(name)?;
            let parsed = raw.parse::<u64>().ok();
            if parsed.is_none() {
                ignored.push(IgnoredVar {
                    name,
                    value: raw,
                    expected: "a whole number",
                });
            }
            parsed
        };
        let http_timeout = number("CAMPUSD_HTTP_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);
        let attempts = number("CAMPUSD_FETCH_RETRIES")
            .map(|n| n.clamp(1, 20) as u32)
            .unwrap_or(defaults.retry.attempts);
        let backoff = number("CAMPUSD_FETCH_BACKOFF_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.backoff);
        let log_json = match text("CAMPUSD_LOG_JSON") {
            None => defaults.log_json,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                ignored.push(IgnoredVar {
                    name: "CAMPUSD_LOG_JSON",
                    value: raw,
                    expected: "a boolean",
                });
                defaults.log_json
            }),
        };
        Self {
            base_url: text("CAMPUSD_BASE_URL"),
            workspace: text("CAMPUSD_WORKSPACE").map(PathBuf::from),
            downloads_dir: text("CAMPUSD_DOWNLOADS_DIR").map(PathBuf::from),
            actor: text("CAMPUSD_ACTOR").unwrap_or(defaults.actor),
            http_timeout,
            retry: RetryPolicy { attempts, backoff },
            log_json,
            ignored,
        }
    }

    /// Called once logging is up; config is read before the subscriber exists.
    pub fn warn_ignored(&self) {
        for var in &self.ignored {
            tracing::warn!(
                name = var.name,
                value = %var.value,
                "ignoring {}: expected {}, using the default",
                var.name,
                var.expected
            );
        }
    }

    /// Explicit override, else `{workspace}/downloads`, else `./downloads`.
    pub fn downloads_for(&self, workspace: Option<&Path>) -> PathBuf {
        if let Some(dir) = &self.downloads_dir {
            return dir.clone();
        }
        match workspace {
            Some(ws) => ws.join("downloads"),
            None => PathBuf::from("downloads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.actor, "system");
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.backoff, Duration::from_millis(250));
        assert!(cfg.base_url.is_none());
        assert!(!cfg.log_json);
        assert_eq!(cfg.downloads_for(None), PathBuf::from("downloads"));
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let cfg = Config::from_lookup(lookup(&[
            ("CAMPUSD_BASE_URL", "http://localhost:9000"),
            ("CAMPUSD_ACTOR", "  registrar "),
            ("CAMPUSD_HTTP_TIMEOUT_SECS", "abc"),
            ("CAMPUSD_FETCH_RETRIES", "0"),
            ("CAMPUSD_LOG_JSON", "On"),
        ]));
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.actor, "registrar");
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.retry.attempts, 1);
        assert!(cfg.log_json);
        let names: Vec<_> = cfg.ignored.iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["CAMPUSD_HTTP_TIMEOUT_SECS"]);
        assert_eq!(cfg.ignored[0].value, "abc");
    }

    #[test]
    fn every_unparseable_value_is_recorded() {
        let cfg = Config::from_lookup(lookup(&[
            ("CAMPUSD_FETCH_RETRIES", "three"),
            ("CAMPUSD_FETCH_BACKOFF_MS", "-5"),
            ("CAMPUSD_LOG_JSON", "maybe"),
        ]));
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.backoff, Duration::from_millis(250));
        assert!(!cfg.log_json);
        let names: Vec<_> = cfg.ignored.iter().map(|v| v.name).collect();
        assert_eq!(
            names,
            vec!["CAMPUSD_FETCH_RETRIES", "CAMPUSD_FETCH_BACKOFF_MS", "CAMPUSD_LOG_JSON"]
        );
        assert!(Config::from_lookup(lookup(&[])).ignored.is_empty());
    }

    #[test]
    fn downloads_follow_the_workspace_unless_overridden() {
        let cfg = Config::default();
        assert_eq!(
            cfg.downloads_for(Some(Path::new("/data/ws"))),
            PathBuf::from("/data/ws/downloads")
        );
        let cfg = Config::from_lookup(lookup(&[("CAMPUSD_DOWNLOADS_DIR", "/tmp/dl")]));
        assert_eq!(cfg.downloads_for(Some(Path::new("/data/ws"))), PathBuf::from("/tmp/dl"));
    }

    #[test]
    fn bool_values() {
        for v in ["1", "true", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["0", "false", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
