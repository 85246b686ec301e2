//! Service configuration.

use serde::Deserialize;
use std::time::Duration;

/// Default budget for one code run, in seconds.
pub const DEFAULT_RUN_BUDGET_SECS: u64 = 300;

/// Default headroom reserved for the harvest pass after the run, in seconds.
/// Kept separate from the run budget so a run that consumes its whole budget
/// still leaves time to collect whatever it wrote.
pub const DEFAULT_HARVEST_BUDGET_SECS: u64 = 60;

/// Default idle budget granted to a session on every acquisition, in seconds.
pub const DEFAULT_IDLE_BUDGET_SECS: u64 = 600;

/// Directory inside the session where executed code writes its output files.
pub const DEFAULT_OUTPUT_DIR: &str = "/code";

/// Top-level configuration, loaded from a JSON file or the environment at
/// startup. Missing fields fall back to the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the execution backend API.
    pub backend_url: String,
    /// Base URL of the object storage endpoint (S3-compatible).
    pub storage_url: String,
    /// Bucket receiving uploaded artifacts.
    pub bucket: String,
    /// Fixed key prefix under which all artifacts are namespaced.
    pub key_prefix: String,
    /// Directory scanned for filesystem artifacts after each run.
    pub output_dir: String,
    /// Also scan the session root, the broadened scope of older deployments.
    pub scan_session_root: bool,
    /// Budget for a single code run, in seconds.
    pub run_budget_secs: u64,
    /// Headroom for the harvest pass after the run, in seconds.
    pub harvest_budget_secs: u64,
    /// Inactivity budget set on sessions at every acquisition, in seconds.
    pub idle_budget_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8090".to_string(),
            storage_url: "http://localhost:9000".to_string(),
            bucket: "artifacts".to_string(),
            key_prefix: "harvest".to_string(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            scan_session_root: false,
            run_budget_secs: DEFAULT_RUN_BUDGET_SECS,
            harvest_budget_secs: DEFAULT_HARVEST_BUDGET_SECS,
            idle_budget_secs: DEFAULT_IDLE_BUDGET_SECS,
        }
    }
}

impl Config {
    /// Parse a config from a JSON document; unspecified fields keep their
    /// defaults.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Build a config from `HARVESTD_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("HARVESTD_BACKEND_URL") {
            cfg.backend_url = v;
        }
        if let Ok(v) = std::env::var("HARVESTD_STORAGE_URL") {
            cfg.storage_url = v;
        }
        if let Ok(v) = std::env::var("HARVESTD_BUCKET") {
            cfg.bucket = v;
        }
        if let Ok(v) = std::env::var("HARVESTD_KEY_PREFIX") {
            cfg.key_prefix = v;
        }
        if let Ok(v) = std::env::var("HARVESTD_OUTPUT_DIR") {
            cfg.output_dir = v;
        }
        if let Ok(v) = std::env::var("HARVESTD_SCAN_SESSION_ROOT") {
            cfg.scan_session_root = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = env_u64("HARVESTD_RUN_BUDGET_SECS") {
            cfg.run_budget_secs = v;
        }
        if let Some(v) = env_u64("HARVESTD_HARVEST_BUDGET_SECS") {
            cfg.harvest_budget_secs = v;
        }
        if let Some(v) = env_u64("HARVESTD_IDLE_BUDGET_SECS") {
            cfg.idle_budget_secs = v;
        }
        cfg
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }

    pub fn harvest_budget(&self) -> Duration {
        Duration::from_secs(self.harvest_budget_secs)
    }

    pub fn idle_budget(&self) -> Duration {
        Duration::from_secs(self.idle_budget_secs)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let cfg = Config::from_json(r#"{"bucket": "reports", "run_budget_secs": 120}"#).unwrap();
        assert_eq!(cfg.bucket, "reports");
        assert_eq!(cfg.run_budget_secs, 120);
        assert_eq!(cfg.harvest_budget_secs, DEFAULT_HARVEST_BUDGET_SECS);
        assert_eq!(cfg.output_dir, DEFAULT_OUTPUT_DIR);
    }

    #[test]
    fn empty_json_is_the_default_config() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.backend_url, Config::default().backend_url);
        assert!(!cfg.scan_session_root);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Config::from_json("not json").is_err());
    }
}
